//! Retry-and-timing wrappers around stage calls.
//!
//! Both wrappers run the stage up to `max_attempts` times, log every failed
//! attempt, write one stage log per invocation and record the invocation in
//! [`RunMetrics`]. They return the last error after exhaustion; deciding
//! whether that error is fatal is left to the caller.

use std::future::Future;
use std::time::{Duration, Instant};

use chrono::{SecondsFormat, Utc};
use serde_json::Value;
use tracing::{info, warn};

use crate::error::Result;
use crate::runlog::logger::{ErrorRecord, RunLogger, StageLog, StageStatus};
use crate::runlog::metrics::{RunMetrics, Stage};

/// Describes one wrapped invocation.
pub struct StageCall<'a> {
    pub stage: Stage,
    /// Campaign or hypothesis the call concerns, if any.
    pub scope: Option<&'a str>,
    pub max_attempts: u32,
    /// Delay before each retry in milliseconds; the last value repeats.
    /// Only `execute_async` sleeps.
    pub backoff_ms: &'a [u64],
    pub input: Value,
}

impl<'a> StageCall<'a> {
    pub fn new(stage: Stage, input: Value) -> Self {
        Self {
            stage,
            scope: None,
            max_attempts: 1,
            backoff_ms: &[],
            input,
        }
    }

    pub fn scope(mut self, scope: &'a str) -> Self {
        self.scope = Some(scope);
        self
    }

    pub fn attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn backoff(mut self, backoff_ms: &'a [u64]) -> Self {
        self.backoff_ms = backoff_ms;
        self
    }

    fn delay_before(&self, attempt: u32) -> Duration {
        let idx = attempt.saturating_sub(2) as usize;
        let ms = self
            .backoff_ms
            .get(idx)
            .or_else(|| self.backoff_ms.last())
            .copied()
            .unwrap_or(0);
        Duration::from_millis(ms)
    }
}

/// Wrapper for compute stages. `f` runs inline and receives the 1-based
/// attempt number. Retries are immediate.
pub async fn execute<T, F, S>(
    logger: &mut RunLogger,
    metrics: &mut RunMetrics,
    call: StageCall<'_>,
    mut f: F,
    snapshot: S,
) -> Result<T>
where
    F: FnMut(u32) -> Result<T>,
    S: Fn(&T) -> Value,
{
    let started_at = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
    let start = Instant::now();
    let mut attempt_errors = Vec::new();
    let mut attempt = 0;

    let result = loop {
        attempt += 1;
        match f(attempt) {
            Ok(v) => break Ok(v),
            Err(e) => {
                log_attempt_failure(&call, attempt, &e);
                attempt_errors.push(ErrorRecord::from(&e));
                if attempt >= call.max_attempts {
                    break Err(e);
                }
            }
        }
    };

    finish(logger, metrics, call, started_at, start.elapsed(), attempt, attempt_errors, result, snapshot).await
}

/// Async wrapper for I/O stages. Sleeps per the backoff schedule between attempts.
pub async fn execute_async<T, F, Fut, S>(
    logger: &mut RunLogger,
    metrics: &mut RunMetrics,
    call: StageCall<'_>,
    mut f: F,
    snapshot: S,
) -> Result<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T>>,
    S: Fn(&T) -> Value,
{
    let started_at = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
    let start = Instant::now();
    let mut attempt_errors = Vec::new();
    let mut attempt = 0;

    let result = loop {
        attempt += 1;
        if attempt > 1 {
            let delay = call.delay_before(attempt);
            warn!(
                stage = %call.stage,
                attempt,
                "[{}] retrying in {}ms",
                call.stage,
                delay.as_millis(),
            );
            tokio::time::sleep(delay).await;
        }
        match f(attempt).await {
            Ok(v) => break Ok(v),
            Err(e) => {
                log_attempt_failure(&call, attempt, &e);
                attempt_errors.push(ErrorRecord::from(&e));
                if attempt >= call.max_attempts {
                    break Err(e);
                }
            }
        }
    };

    finish(logger, metrics, call, started_at, start.elapsed(), attempt, attempt_errors, result, snapshot).await
}

fn log_attempt_failure(call: &StageCall<'_>, attempt: u32, e: &crate::error::AppError) {
    warn!(
        stage = %call.stage,
        scope = call.scope.unwrap_or("-"),
        attempt,
        max_attempts = call.max_attempts,
        error = %e,
        "[{}] attempt {}/{} failed: {e}",
        call.stage,
        attempt,
        call.max_attempts,
    );
}

#[allow(clippy::too_many_arguments)]
async fn finish<T, S>(
    logger: &mut RunLogger,
    metrics: &mut RunMetrics,
    call: StageCall<'_>,
    started_at: String,
    elapsed: Duration,
    attempts: u32,
    attempt_errors: Vec<ErrorRecord>,
    result: Result<T>,
    snapshot: S,
) -> Result<T>
where
    S: Fn(&T) -> Value,
{
    let failed = result.is_err();
    metrics.record_stage(call.stage, attempts, elapsed, failed);

    let entry = StageLog {
        seq: logger.next_seq(),
        stage: call.stage,
        scope: call.scope.map(str::to_string),
        started_at,
        duration_ms: elapsed.as_secs_f64() * 1_000.0,
        attempts,
        status: if failed { StageStatus::Failed } else { StageStatus::Ok },
        input: call.input,
        output: result.as_ref().ok().map(&snapshot),
        attempt_errors,
    };
    logger.write_stage(&entry).await;

    if failed {
        warn!(
            stage = %call.stage,
            scope = call.scope.unwrap_or("-"),
            attempts,
            "[{}] gave up after {} attempt(s)",
            call.stage,
            attempts,
        );
    } else {
        info!(
            stage = %call.stage,
            scope = call.scope.unwrap_or("-"),
            attempts,
            duration_ms = entry.duration_ms,
            "[{}] done in {:.2}ms",
            call.stage,
            entry.duration_ms,
        );
    }
    result
}
