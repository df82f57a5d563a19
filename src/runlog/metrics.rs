use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use chrono::{SecondsFormat, Utc};
use serde::Serialize;

use crate::runlog::latency::{LatencySummary, StageLatency};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Load,
    Schema,
    Plan,
    Insight,
    Evaluate,
    Creative,
    Artifacts,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Stage::Load => "load",
            Stage::Schema => "schema",
            Stage::Plan => "plan",
            Stage::Insight => "insight",
            Stage::Evaluate => "evaluate",
            Stage::Creative => "creative",
            Stage::Artifacts => "artifacts",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Default)]
struct StageMetrics {
    invocations: u64,
    attempts: u64,
    retries: u64,
    errors: u64,
    total: Duration,
    latency: StageLatency,
}

#[derive(Debug, Clone, Serialize)]
pub struct StageMetricsSnapshot {
    pub invocations: u64,
    pub attempts: u64,
    pub retries: u64,
    pub errors: u64,
    pub total_ms: f64,
    pub latency: LatencySummary,
}

/// Run-level counters outside any single stage.
#[derive(Debug, Default, Clone, Serialize)]
pub struct RunCounters {
    pub rows_loaded: usize,
    pub rows_kept: usize,
    pub rows_dropped: usize,
    pub campaigns_scanned: usize,
    pub campaigns_selected: usize,
    pub campaigns_processed: usize,
    pub hypotheses_generated: usize,
    pub insights_validated: usize,
    pub low_confidence_rejections: usize,
    /// Generated hypotheses whose evaluation failed.
    pub hypothesis_errors: usize,
    /// Selected campaigns for which no hypotheses could be generated.
    pub campaign_errors: usize,
    pub recommendations: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub status: RunStatus,
    pub started_at: String,
    pub duration_ms: f64,
    pub stages: BTreeMap<Stage, StageMetricsSnapshot>,
    pub counters: RunCounters,
    pub total_retries: u64,
    pub total_errors: u64,
    pub fatal_error: Option<String>,
}

/// Accumulator for one run. Stage wrappers write to it; stages never read it.
#[derive(Debug)]
pub struct RunMetrics {
    started_at: String,
    started: Instant,
    stages: BTreeMap<Stage, StageMetrics>,
    pub counters: RunCounters,
    status: RunStatus,
    fatal_error: Option<String>,
}

impl RunMetrics {
    pub fn new() -> Self {
        Self {
            started_at: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            started: Instant::now(),
            stages: BTreeMap::new(),
            counters: RunCounters::default(),
            status: RunStatus::Running,
            fatal_error: None,
        }
    }

    /// Record one wrapped stage invocation.
    pub fn record_stage(&mut self, stage: Stage, attempts: u32, elapsed: Duration, failed: bool) {
        let m = self.stages.entry(stage).or_default();
        m.invocations += 1;
        m.attempts += u64::from(attempts);
        m.retries += u64::from(attempts.saturating_sub(1));
        if failed {
            m.errors += 1;
        }
        m.total += elapsed;
        m.latency.record(elapsed);
    }

    pub fn succeed(&mut self) {
        self.status = RunStatus::Succeeded;
    }

    pub fn fail(&mut self, reason: impl Into<String>) {
        self.status = RunStatus::Failed;
        self.fatal_error = Some(reason.into());
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let stages: BTreeMap<Stage, StageMetricsSnapshot> = self
            .stages
            .iter()
            .map(|(stage, m)| {
                (
                    *stage,
                    StageMetricsSnapshot {
                        invocations: m.invocations,
                        attempts: m.attempts,
                        retries: m.retries,
                        errors: m.errors,
                        total_ms: m.total.as_secs_f64() * 1_000.0,
                        latency: m.latency.summary(),
                    },
                )
            })
            .collect();
        MetricsSnapshot {
            status: self.status,
            started_at: self.started_at.clone(),
            duration_ms: self.started.elapsed().as_secs_f64() * 1_000.0,
            total_retries: stages.values().map(|s| s.retries).sum(),
            total_errors: stages.values().map(|s| s.errors).sum(),
            stages,
            counters: self.counters.clone(),
            fatal_error: self.fatal_error.clone(),
        }
    }
}

impl Default for RunMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aggregates_retries_and_errors_per_stage() {
        let mut m = RunMetrics::new();
        m.record_stage(Stage::Evaluate, 1, Duration::from_micros(50), false);
        m.record_stage(Stage::Evaluate, 3, Duration::from_micros(80), true);
        m.record_stage(Stage::Load, 2, Duration::from_millis(1), false);

        let snap = m.snapshot();
        let eval = &snap.stages[&Stage::Evaluate];
        assert_eq!(eval.invocations, 2);
        assert_eq!(eval.attempts, 4);
        assert_eq!(eval.retries, 2);
        assert_eq!(eval.errors, 1);
        assert_eq!(snap.total_retries, 3);
        assert_eq!(snap.total_errors, 1);
        assert_eq!(snap.status, RunStatus::Running);
    }

    #[test]
    fn failure_is_recorded_in_snapshot() {
        let mut m = RunMetrics::new();
        m.fail("schema error");
        let json = serde_json::to_value(m.snapshot()).unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["fatal_error"], "schema error");
    }
}
