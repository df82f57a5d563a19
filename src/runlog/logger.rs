use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, warn};

use crate::error::AppError;
use crate::runlog::metrics::{MetricsSnapshot, Stage};

pub const METRICS_FILE: &str = "run_metrics.json";
pub const SCHEMA_ERROR_FILE: &str = "schema_error.json";
pub const RUN_ERROR_FILE: &str = "run_error.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Ok,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorRecord {
    pub kind: String,
    pub message: String,
}

impl From<&AppError> for ErrorRecord {
    fn from(e: &AppError) -> Self {
        Self {
            kind: e.kind().to_string(),
            message: e.to_string(),
        }
    }
}

/// One wrapped stage invocation, as written to disk.
#[derive(Debug, Clone, Serialize)]
pub struct StageLog {
    pub seq: u32,
    pub stage: Stage,
    pub scope: Option<String>,
    pub started_at: String,
    pub duration_ms: f64,
    pub attempts: u32,
    pub status: StageStatus,
    pub input: serde_json::Value,
    pub output: Option<serde_json::Value>,
    /// Errors of every failed attempt, oldest first.
    pub attempt_errors: Vec<ErrorRecord>,
}

/// Writes stage logs and error artifacts under the log directory.
/// Write failures are logged and swallowed; logging never fails a run.
#[derive(Debug)]
pub struct RunLogger {
    log_dir: PathBuf,
    seq: u32,
}

impl RunLogger {
    pub fn new(log_dir: impl Into<PathBuf>) -> Self {
        Self {
            log_dir: log_dir.into(),
            seq: 0,
        }
    }

    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    pub fn next_seq(&mut self) -> u32 {
        self.seq += 1;
        self.seq
    }

    pub async fn write_stage(&self, entry: &StageLog) -> Option<PathBuf> {
        let mut name = format!("{:03}_{}", entry.seq, entry.stage);
        if let Some(scope) = &entry.scope {
            name.push('_');
            name.push_str(&sanitize(scope));
        }
        name.push_str(".json");
        self.write_json(&name, entry).await
    }

    pub async fn write_metrics(&self, snapshot: &MetricsSnapshot) -> Option<PathBuf> {
        self.write_json(METRICS_FILE, snapshot).await
    }

    /// Schema violations go to their own artifact; any other fatal error to `run_error.json`.
    pub async fn write_error(&self, err: &AppError) -> Option<PathBuf> {
        let name = match err {
            AppError::Schema(_) => SCHEMA_ERROR_FILE,
            _ => RUN_ERROR_FILE,
        };
        self.write_json(name, &err.artifact()).await
    }

    async fn write_json<T: Serialize>(&self, name: &str, value: &T) -> Option<PathBuf> {
        let path = self.log_dir.join(name);
        let body = match serde_json::to_vec_pretty(value) {
            Ok(b) => b,
            Err(e) => {
                warn!("[RUNLOG] could not serialize {name}: {e}");
                return None;
            }
        };
        if let Err(e) = tokio::fs::create_dir_all(&self.log_dir).await {
            warn!("[RUNLOG] could not create {}: {e}", self.log_dir.display());
            return None;
        }
        match tokio::fs::write(&path, body).await {
            Ok(()) => {
                debug!(path = %path.display(), "log artifact written");
                Some(path)
            }
            Err(e) => {
                warn!("[RUNLOG] could not write {}: {e}", path.display());
                None
            }
        }
    }
}

/// Keep file names portable: campaign names may hold spaces or slashes.
fn sanitize(scope: &str) -> String {
    let s: String = scope
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '-' })
        .take(64)
        .collect();
    s.trim_matches('-').to_string()
}
