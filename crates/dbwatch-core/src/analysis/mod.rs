//! Threshold evaluation of probe results.
//!
//! Evaluation is a pure function of the latest slow-query set and stats:
//! nothing is remembered between checks.

pub mod rules;

use serde::Serialize;

use crate::config::Thresholds;
use crate::model::{DatabaseStats, SlowQueryRecord};
use rules::{AnalysisRule, all_rules};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Normal,
    Warning,
}

/// A threshold crossing observed during a check.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Finding {
    pub rule_id: &'static str,
    pub severity: Severity,
    pub subject: String,
    pub message: String,
    /// Observed value that crossed the threshold.
    pub value: f64,
}

/// Inputs passed to each rule.
pub struct AnalysisContext<'a> {
    pub slow_queries: &'a [SlowQueryRecord],
    pub stats: &'a DatabaseStats,
}

/// Applies the rule set in order.
pub struct Evaluator {
    rules: Vec<Box<dyn AnalysisRule>>,
}

impl Evaluator {
    pub fn new(thresholds: &Thresholds) -> Self {
        Self {
            rules: all_rules(thresholds),
        }
    }

    /// Findings in rule order; within a rule, in input order.
    pub fn evaluate(
        &self,
        slow_queries: &[SlowQueryRecord],
        stats: &DatabaseStats,
    ) -> Vec<Finding> {
        let ctx = AnalysisContext {
            slow_queries,
            stats,
        };
        self.rules
            .iter()
            .flat_map(|rule| rule.evaluate(&ctx))
            .collect()
    }

    pub fn rule_ids(&self) -> Vec<&'static str> {
        self.rules.iter().map(|r| r.id()).collect()
    }
}

impl Default for Evaluator {
    fn default() -> Self {
        Self::new(&Thresholds::default())
    }
}

/// Evaluates with the default thresholds.
pub fn evaluate(slow_queries: &[SlowQueryRecord], stats: &DatabaseStats) -> Vec<Finding> {
    Evaluator::default().evaluate(slow_queries, stats)
}
