//! Console rendering of a check.

use tracing::{info, warn};

use crate::analysis::Severity;
use crate::analysis::rules::{classify_above, classify_below};
use crate::config::Thresholds;
use crate::fmt::{excerpt, format_ms};
use crate::model::{DatabaseStats, StatValue};
use crate::monitor::CheckSummary;

const RULE: &str = "======================================================================";

/// Query excerpt length in per-query log lines.
const EXCERPT_LEN: usize = 80;

/// Logs the banner, slow queries and statistics of a check.
pub fn log_check(summary: &CheckSummary, thresholds: &Thresholds) {
    info!("{}", RULE);
    info!("Database Performance Check");
    info!("{}", RULE);
    info!("Time: {}", summary.timestamp.format("%Y-%m-%d %H:%M:%S UTC"));
    info!("Database: {}", summary.dialect);

    if summary.slow_queries.is_empty() {
        info!("No slow queries detected");
    } else {
        warn!("Found {} slow queries:", summary.slow_queries.len());
        for (i, q) in summary.slow_queries.iter().enumerate() {
            warn!("  {}. PID {}: {}", i + 1, q.pid, format_ms(q.duration_ms));
            warn!("     Query: {}", excerpt(&q.query_preview, EXCERPT_LEN));
        }
    }

    info!("");
    info!("Database Statistics:");
    let lines = stat_lines(&summary.stats, thresholds);
    if lines.is_empty() {
        info!("  (no statistics available)");
    }
    for line in lines {
        info!("  {}", line);
    }

    if summary.probe_failures > 0 {
        warn!(
            "{} probe(s) failed, results are partial",
            summary.probe_failures
        );
    }
    if !summary.findings.is_empty() {
        warn!("{} alert(s) raised", summary.findings.len());
    }
}

/// Logs the closing banner of a check.
pub fn log_check_end() {
    info!("{}", RULE);
    info!("");
}

/// `name: value` lines, marking values that cross a threshold.
pub fn stat_lines(stats: &DatabaseStats, thresholds: &Thresholds) -> Vec<String> {
    stats
        .entries()
        .into_iter()
        .map(|(name, value)| {
            let severity = match (name, &value) {
                ("active_connections", StatValue::Count(n)) => {
                    classify_above(*n as f64, thresholds.max_active_connections as f64)
                }
                ("cache_hit_ratio", StatValue::Percent(r)) => {
                    classify_below(*r, thresholds.min_cache_hit_ratio)
                }
                _ => Severity::Normal,
            };
            match severity {
                Severity::Normal => format!("{}: {}", name, value),
                Severity::Warning => format!("{}: {} (warning)", name, value),
            }
        })
        .collect()
}

/// Summary block printed after a one-shot check.
pub fn render_summary(summary: &CheckSummary) -> String {
    let mut out = String::new();
    out.push_str(RULE);
    out.push('\n');
    out.push_str("Summary:\n");
    out.push_str(&format!("Slow queries found: {}\n", summary.slow_queries_count));
    out.push_str(&format!("Alerts raised: {}\n", summary.findings.len()));
    out.push_str(RULE);
    out
}
