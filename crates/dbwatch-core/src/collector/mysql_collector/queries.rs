//! SQL for the MySQL probe set.

/// Non-sleeping threads running longer than `?` milliseconds, longest first.
///
/// `Time` has whole-second granularity; with the default threshold of
/// 1000 ms the predicate is equivalent to `Time > 1`.
pub(super) const SLOW_QUERIES: &str = r#"
    SELECT
        Id AS pid,
        User AS usename,
        db AS datname,
        Time AS duration_seconds,
        State AS state,
        LEFT(Info, 200) AS query_preview
    FROM information_schema.PROCESSLIST
    WHERE Command != 'Sleep'
        AND Time * 1000 > ?
        AND Id != CONNECTION_ID()
    ORDER BY Time DESC
"#;

pub(super) const ACTIVE_CONNECTIONS: &str =
    "SELECT COUNT(*) FROM information_schema.PROCESSLIST WHERE Command != 'Sleep'";

pub(super) const TOTAL_CONNECTIONS: &str = "SELECT COUNT(*) FROM information_schema.PROCESSLIST";

pub(super) const DATABASE_SIZE: &str = r#"
    SELECT CONCAT(ROUND(SUM(data_length + index_length) / 1024 / 1024, 2), ' MB')
    FROM information_schema.TABLES
    WHERE table_schema = DATABASE()
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slow_queries_skip_sleeping_threads_and_own_connection() {
        assert!(SLOW_QUERIES.contains("Command != 'Sleep'"));
        assert!(SLOW_QUERIES.contains("Id != CONNECTION_ID()"));
        assert!(SLOW_QUERIES.contains("ORDER BY Time DESC"));
        assert!(SLOW_QUERIES.contains("LEFT(Info, 200)"));
    }

    #[test]
    fn size_is_scoped_to_current_schema() {
        assert!(DATABASE_SIZE.contains("table_schema = DATABASE()"));
        assert!(DATABASE_SIZE.contains("' MB'"));
    }

    #[test]
    fn probes_are_read_only() {
        for q in [
            SLOW_QUERIES,
            ACTIVE_CONNECTIONS,
            TOTAL_CONNECTIONS,
            DATABASE_SIZE,
        ] {
            assert!(q.trim_start().starts_with("SELECT"), "{q}");
        }
    }
}
