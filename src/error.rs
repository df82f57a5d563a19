use serde::Serialize;
use thiserror::Error;

/// Required-column violation found by the schema guard. Fatal for the run.
#[derive(Debug, Clone, Serialize)]
pub struct SchemaViolation {
    pub missing: Vec<String>,
    pub found: Vec<String>,
    pub required: Vec<String>,
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Schema error: missing required columns: {}", .0.missing.join(", "))]
    Schema(SchemaViolation),

    #[error("Load error after {attempts} attempt(s): {reason}")]
    Load { attempts: u32, reason: String },

    #[error("Hypothesis computation error ({hypothesis}): {reason}")]
    HypothesisComputation { hypothesis: String, reason: String },

    #[error("CSV parse error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, AppError>;

impl AppError {
    /// Short machine-readable tag used in error artifacts and stage logs.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Schema(_) => "schema_error",
            AppError::Load { .. } => "load_error",
            AppError::HypothesisComputation { .. } => "hypothesis_computation_error",
            AppError::Csv(_) => "csv_error",
            AppError::Json(_) => "json_error",
            AppError::Config(_) => "config_error",
            AppError::Io(_) => "io_error",
        }
    }

    /// Only schema violations and exhausted loads end the run.
    pub fn is_fatal(&self) -> bool {
        matches!(self, AppError::Schema(_) | AppError::Load { .. })
    }

    /// Structured body written to `schema_error.json` / `run_error.json`.
    pub fn artifact(&self) -> serde_json::Value {
        let mut body = serde_json::json!({
            "error": self.kind(),
            "message": self.to_string(),
            "fatal": self.is_fatal(),
        });
        match self {
            AppError::Schema(v) => {
                body["missing_columns"] = serde_json::json!(v.missing);
                body["found_columns"] = serde_json::json!(v.found);
                body["required_columns"] = serde_json::json!(v.required);
            }
            AppError::Load { attempts, .. } => {
                body["attempts"] = serde_json::json!(attempts);
            }
            _ => {}
        }
        body
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_artifact_lists_missing_columns() {
        let err = AppError::Schema(SchemaViolation {
            missing: vec!["roas".to_string()],
            found: vec!["spend".to_string()],
            required: vec!["spend".to_string(), "roas".to_string()],
        });
        let body = err.artifact();
        assert_eq!(body["error"], "schema_error");
        assert_eq!(body["missing_columns"][0], "roas");
        assert_eq!(body["fatal"], true);
        assert!(err.to_string().contains("roas"));
    }

    #[test]
    fn hypothesis_errors_are_recoverable() {
        let err = AppError::HypothesisComputation {
            hypothesis: "h_ctr_drop".to_string(),
            reason: "empty window".to_string(),
        };
        assert!(!err.is_fatal());
        let load = AppError::Load { attempts: 3, reason: "gone".to_string() };
        assert!(load.is_fatal());
        assert_eq!(load.artifact()["attempts"], 3);
    }
}
