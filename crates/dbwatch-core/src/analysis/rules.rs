use super::{AnalysisContext, Finding, Severity};
use crate::config::Thresholds;
use crate::fmt::format_ratio;

pub trait AnalysisRule: Send + Sync {
    fn id(&self) -> &'static str;
    fn evaluate(&self, ctx: &AnalysisContext) -> Vec<Finding>;
}

/// Rules in evaluation order.
pub fn all_rules(thresholds: &Thresholds) -> Vec<Box<dyn AnalysisRule>> {
    vec![
        Box::new(VerySlowQueryRule {
            threshold_ms: thresholds.very_slow_query_ms,
        }),
        Box::new(HighActiveConnectionsRule {
            max_active: thresholds.max_active_connections,
        }),
        Box::new(LowCacheHitRatioRule {
            min_ratio: thresholds.min_cache_hit_ratio,
        }),
    ]
}

/// Strictly above the threshold is a warning.
pub fn classify_above(value: f64, threshold: f64) -> Severity {
    if value > threshold {
        Severity::Warning
    } else {
        Severity::Normal
    }
}

/// Strictly below the threshold is a warning.
pub fn classify_below(value: f64, threshold: f64) -> Severity {
    if value < threshold {
        Severity::Warning
    } else {
        Severity::Normal
    }
}

// ============================================================
// VerySlowQueryRule
// ============================================================

pub struct VerySlowQueryRule {
    pub threshold_ms: f64,
}

impl AnalysisRule for VerySlowQueryRule {
    fn id(&self) -> &'static str {
        "very_slow_query"
    }

    fn evaluate(&self, ctx: &AnalysisContext) -> Vec<Finding> {
        ctx.slow_queries
            .iter()
            .filter(|q| classify_above(q.duration_ms, self.threshold_ms) == Severity::Warning)
            .map(|q| Finding {
                rule_id: self.id(),
                severity: Severity::Warning,
                subject: format!("Very Slow Query Detected (PID {})", q.pid),
                message: format!(
                    "Query running for {:.2}s:\n{}",
                    q.duration_ms / 1000.0,
                    q.query_preview
                ),
                value: q.duration_ms,
            })
            .collect()
    }
}

// ============================================================
// HighActiveConnectionsRule
// ============================================================

pub struct HighActiveConnectionsRule {
    pub max_active: i64,
}

impl AnalysisRule for HighActiveConnectionsRule {
    fn id(&self) -> &'static str {
        "high_active_connections"
    }

    fn evaluate(&self, ctx: &AnalysisContext) -> Vec<Finding> {
        let Some(active) = ctx.stats.active_connections else {
            return Vec::new();
        };
        let severity = classify_above(active as f64, self.max_active as f64);
        if severity == Severity::Normal {
            return Vec::new();
        }

        vec![Finding {
            rule_id: self.id(),
            severity,
            subject: "High Active Connection Count".to_string(),
            message: format!("Active connections: {active}"),
            value: active as f64,
        }]
    }
}

// ============================================================
// LowCacheHitRatioRule
// ============================================================

pub struct LowCacheHitRatioRule {
    pub min_ratio: f64,
}

impl AnalysisRule for LowCacheHitRatioRule {
    fn id(&self) -> &'static str {
        "low_cache_hit_ratio"
    }

    fn evaluate(&self, ctx: &AnalysisContext) -> Vec<Finding> {
        let Some(ratio) = ctx.stats.cache_hit_ratio else {
            return Vec::new();
        };
        if classify_below(ratio, self.min_ratio) == Severity::Normal {
            return Vec::new();
        }

        vec![Finding {
            rule_id: self.id(),
            severity: Severity::Warning,
            subject: "Low Cache Hit Ratio".to_string(),
            message: format!(
                "Cache hit ratio: {}% (should be > {}%)",
                format_ratio(ratio),
                format_ratio(self.min_ratio)
            ),
            value: ratio,
        }]
    }
}
