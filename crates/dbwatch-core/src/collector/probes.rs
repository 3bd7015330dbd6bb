//! Failure-absorbing wrappers around the session probes.
//!
//! Each probe runs independently: a failed probe is logged and contributes
//! an empty result, the remaining probes still run.

use tracing::{debug, warn};

use super::Session;
use crate::model::{DatabaseStats, SlowQueryRecord, clip_preview};

/// Everything gathered during one check.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ProbeResults {
    /// Sorted by descending duration.
    pub slow_queries: Vec<SlowQueryRecord>,
    pub stats: DatabaseStats,
    /// Number of probes that failed during this check.
    pub failures: usize,
}

/// Runs the full probe set against `session`.
pub fn collect<S: Session + ?Sized>(session: &mut S, slow_query_ms: u64) -> ProbeResults {
    let mut failures = 0;

    let slow_queries = match session.slow_query_snapshot(slow_query_ms) {
        Ok(records) => normalize(records),
        Err(e) => {
            warn!("Error fetching slow queries: {}", e);
            failures += 1;
            Vec::new()
        }
    };

    let counts = match session.connection_stats() {
        Ok(counts) => Some(counts),
        Err(e) => {
            warn!("Error fetching connection stats: {}", e);
            failures += 1;
            None
        }
    };

    let size = match session.size_and_cache() {
        Ok(size) => Some(size),
        Err(e) => {
            warn!("Error fetching database size: {}", e);
            failures += 1;
            None
        }
    };

    debug!(
        slow_queries = slow_queries.len(),
        failures, "probe set finished"
    );

    ProbeResults {
        slow_queries,
        stats: DatabaseStats::from_parts(counts, size),
        failures,
    }
}

/// Orders records by descending duration and clips previews.
fn normalize(mut records: Vec<SlowQueryRecord>) -> Vec<SlowQueryRecord> {
    records.sort_by(|a, b| b.duration_ms.total_cmp(&a.duration_ms));
    for record in &mut records {
        if record.query_preview.chars().count() > crate::model::QUERY_PREVIEW_LEN {
            record.query_preview = clip_preview(&record.query_preview);
        }
    }
    records
}
