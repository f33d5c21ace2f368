//! Counters and timings accumulated across explications.
//!
//! The aggregate is mutated by the single driver; at report time it is
//! condensed into per-explication averages and the box-vs-solver split.

use serde::Serialize;
use std::time::Duration;
use tracing::info;

/// Raw accumulators, updated while explications run.
#[derive(Debug, Clone, Default)]
pub struct Metrics {
    /// Wall-clock spent on explications that used the box pre-filter.
    pub accumulated_time_with_box: Duration,
    /// Wall-clock spent on explications that went straight to the solver.
    pub accumulated_time_without_box: Duration,
    /// Wall-clock spent inside box propagation alone.
    pub accumulated_box_time: Duration,
    /// Features proven irrelevant by the box.
    pub irrelevant_by_box: u64,
    /// Features proven irrelevant by the solver.
    pub irrelevant_by_solver: u64,
    /// Continuous variables in the encoding.
    pub continuous_vars: u64,
    /// Binary variables in the encoding.
    pub binary_vars: u64,
    /// Constraints in the encoding.
    pub constraints: u64,
}

impl Metrics {
    /// Fresh, all-zero accumulators.
    pub fn new() -> Self {
        Self::default()
    }

    /// Total features proven irrelevant, by either route.
    pub fn total_irrelevant(&self) -> u64 {
        self.irrelevant_by_box + self.irrelevant_by_solver
    }

    /// Condense into per-explication averages.
    ///
    /// `number_executions` is how many times the whole input set was run
    /// (for repeated timing runs); `inputs_per_execution` is the number of
    /// explicated inputs per run.
    pub fn summarize(
        &self,
        number_executions: usize,
        inputs_per_execution: usize,
    ) -> MetricsSummary {
        let explications = (number_executions * inputs_per_execution).max(1) as f64;
        let by_box = self.irrelevant_by_box as f64 / explications;
        let by_solver = self.irrelevant_by_solver as f64 / explications;
        let total = by_box + by_solver;
        let (pct_box, pct_solver) = if total > 0.0 {
            (by_box / total, by_solver / total)
        } else {
            (0.0, 0.0)
        };
        MetricsSummary {
            avg_time_with_box: self.accumulated_time_with_box.as_secs_f64() / explications,
            avg_time_without_box: self.accumulated_time_without_box.as_secs_f64() / explications,
            avg_box_time: self.accumulated_box_time.as_secs_f64() / explications,
            avg_irrelevant_by_box: by_box,
            avg_irrelevant_by_solver: by_solver,
            percentage_irrelevant_by_box: pct_box,
            percentage_irrelevant_by_solver: pct_solver,
            continuous_vars: self.continuous_vars,
            binary_vars: self.binary_vars,
            constraints: self.constraints,
        }
    }
}

/// Per-explication averages, ready for reporting.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSummary {
    /// Average seconds per explication with the box pre-filter.
    pub avg_time_with_box: f64,
    /// Average seconds per explication without it.
    pub avg_time_without_box: f64,
    /// Average seconds spent inside box propagation.
    pub avg_box_time: f64,
    /// Average features per explication dropped by the box.
    pub avg_irrelevant_by_box: f64,
    /// Average features per explication dropped by the solver.
    pub avg_irrelevant_by_solver: f64,
    /// Share of dropped features settled by the box.
    pub percentage_irrelevant_by_box: f64,
    /// Share of dropped features that needed the solver.
    pub percentage_irrelevant_by_solver: f64,
    /// Continuous variables in the encoding.
    pub continuous_vars: u64,
    /// Binary variables in the encoding.
    pub binary_vars: u64,
    /// Constraints in the encoding.
    pub constraints: u64,
}

impl MetricsSummary {
    /// Log the report.
    pub fn report(&self) {
        info!("--------------------------------------------------------------------------------");
        info!(
            "timings per explication: {:.4}s without box, {:.4}s with box",
            self.avg_time_without_box, self.avg_time_with_box
        );
        info!(
            "box: {:.4}s average, {:.4} features dropped ({:.2}%); solver: {:.4} features dropped ({:.2}%)",
            self.avg_box_time,
            self.avg_irrelevant_by_box,
            self.percentage_irrelevant_by_box * 100.0,
            self.avg_irrelevant_by_solver,
            self.percentage_irrelevant_by_solver * 100.0
        );
        info!(
            "encoding size: {} continuous vars, {} binary vars, {} constraints",
            self.continuous_vars, self.binary_vars, self.constraints
        );
        let (verdict, diff) = if self.avg_time_with_box < self.avg_time_without_box {
            ("better", self.avg_time_without_box - self.avg_time_with_box)
        } else {
            ("worse", self.avg_time_with_box - self.avg_time_without_box)
        };
        info!("running with box was {verdict} than without by {diff:.4}s");
    }
}
