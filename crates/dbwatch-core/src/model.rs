//! Probe result types.
//!
//! Everything here is produced fresh on each check and never persisted.

use serde::Serialize;

/// Maximum length of a query preview, in characters.
pub const QUERY_PREVIEW_LEN: usize = 200;

/// A session that has been running a statement longer than the slow-query threshold.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct SlowQueryRecord {
    pub pid: i64,
    pub user: String,
    pub database: Option<String>,
    /// Running time, normalized to milliseconds for every dialect.
    pub duration_ms: f64,
    pub state: String,
    pub query_preview: String,
    /// postgresql only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wait_event_type: Option<String>,
    /// postgresql only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wait_event: Option<String>,
}

/// Connection counters returned by the connection-stats probe.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ConnectionCounts {
    pub active: i64,
    pub total: i64,
}

/// Output of the size-and-cache probe.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SizeAndCache {
    /// Human-readable size, e.g. "7453 kB" or "12.50 MB".
    pub database_size: Option<String>,
    /// Percentage of block reads served from cache. postgresql only.
    pub cache_hit_ratio: Option<f64>,
}

/// Database-wide statistics of one check.
///
/// Keys are absent when the dialect does not report them or the probe failed.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct DatabaseStats {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_connections: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_connections: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database_size: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_hit_ratio: Option<f64>,
}

/// Single reported statistic value.
#[derive(Clone, Debug, PartialEq)]
pub enum StatValue {
    Count(i64),
    Size(String),
    Percent(f64),
}

impl std::fmt::Display for StatValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StatValue::Count(n) => write!(f, "{}", n),
            StatValue::Size(s) => f.write_str(s),
            StatValue::Percent(p) => write!(f, "{:.2}%", p),
        }
    }
}

impl DatabaseStats {
    /// Merges the outputs of the stats probes. Either part may be missing.
    pub fn from_parts(counts: Option<ConnectionCounts>, size: Option<SizeAndCache>) -> Self {
        let size = size.unwrap_or_default();
        Self {
            active_connections: counts.map(|c| c.active),
            total_connections: counts.map(|c| c.total),
            database_size: size.database_size,
            cache_hit_ratio: size.cache_hit_ratio,
        }
    }

    /// Present statistics in fixed key order.
    pub fn entries(&self) -> Vec<(&'static str, StatValue)> {
        let mut entries = Vec::with_capacity(4);
        if let Some(n) = self.active_connections {
            entries.push(("active_connections", StatValue::Count(n)));
        }
        if let Some(n) = self.total_connections {
            entries.push(("total_connections", StatValue::Count(n)));
        }
        if let Some(ref s) = self.database_size {
            entries.push(("database_size", StatValue::Size(s.clone())));
        }
        if let Some(r) = self.cache_hit_ratio {
            entries.push(("cache_hit_ratio", StatValue::Percent(r)));
        }
        entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }
}

/// Computes `100 * hits / (hits + reads)` rounded to two decimals.
///
/// Returns `None` when no blocks were accessed at all.
pub fn cache_hit_ratio(hits: i64, reads: i64) -> Option<f64> {
    let total = hits.checked_add(reads)?;
    if total <= 0 {
        return None;
    }
    let ratio = 100.0 * hits as f64 / total as f64;
    Some((ratio * 100.0).round() / 100.0)
}

/// Clips a query text to [`QUERY_PREVIEW_LEN`] characters.
pub fn clip_preview(query: &str) -> String {
    query.chars().take(QUERY_PREVIEW_LEN).collect()
}
