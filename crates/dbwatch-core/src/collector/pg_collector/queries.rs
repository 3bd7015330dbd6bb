//! SQL for the PostgreSQL probe set.

/// Non-idle sessions running longer than `$1` milliseconds, longest first.
pub(super) const SLOW_QUERIES: &str = r#"
    SELECT
        pid::bigint AS pid,
        COALESCE(usename, '')::text AS usename,
        datname::text AS datname,
        (EXTRACT(EPOCH FROM (now() - query_start)) * 1000)::double precision AS duration_ms,
        COALESCE(state, '') AS state,
        wait_event_type,
        wait_event,
        COALESCE(LEFT(query, 200), '') AS query_preview
    FROM pg_stat_activity
    WHERE state != 'idle'
        AND pid != pg_backend_pid()
        AND now() - query_start > make_interval(secs => $1::double precision / 1000)
    ORDER BY duration_ms DESC
"#;

pub(super) const ACTIVE_CONNECTIONS: &str =
    "SELECT COUNT(*) FROM pg_stat_activity WHERE state = 'active'";

pub(super) const TOTAL_CONNECTIONS: &str = "SELECT COUNT(*) FROM pg_stat_activity";

pub(super) const DATABASE_SIZE: &str =
    "SELECT pg_size_pretty(pg_database_size(current_database()))";

/// Raw block counters; the ratio is computed client-side.
pub(super) const CACHE_BLOCKS: &str = r#"
    SELECT
        COALESCE(sum(blks_hit), 0)::bigint AS hits,
        COALESCE(sum(blks_read), 0)::bigint AS reads
    FROM pg_stat_database
    WHERE datname = current_database()
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slow_queries_exclude_idle_and_own_session() {
        assert!(SLOW_QUERIES.contains("state != 'idle'"));
        assert!(SLOW_QUERIES.contains("pid != pg_backend_pid()"));
        assert!(SLOW_QUERIES.contains("ORDER BY duration_ms DESC"));
    }

    #[test]
    fn slow_queries_truncate_preview_to_200_chars() {
        assert!(SLOW_QUERIES.contains("LEFT(query, 200)"));
    }

    #[test]
    fn slow_queries_threshold_is_a_parameter() {
        assert!(SLOW_QUERIES.contains("$1::double precision / 1000"));
    }

    #[test]
    fn probes_are_read_only() {
        for q in [
            SLOW_QUERIES,
            ACTIVE_CONNECTIONS,
            TOTAL_CONNECTIONS,
            DATABASE_SIZE,
            CACHE_BLOCKS,
        ] {
            assert!(q.trim_start().starts_with("SELECT"), "{q}");
        }
    }

    #[test]
    fn cache_blocks_scoped_to_current_database() {
        assert!(CACHE_BLOCKS.contains("FROM pg_stat_database"));
        assert!(CACHE_BLOCKS.contains("datname = current_database()"));
    }
}
