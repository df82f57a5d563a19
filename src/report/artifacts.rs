use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::info;

use crate::error::Result;
use crate::pipeline::RunOutcome;
use crate::report::markdown::render_report;

pub const INSIGHTS_FILE: &str = "insights.json";
pub const CREATIVES_FILE: &str = "creatives.json";
pub const REPORT_FILE: &str = "report.md";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArtifactPaths {
    pub insights: PathBuf,
    pub creatives: PathBuf,
    pub report: PathBuf,
}

impl ArtifactPaths {
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            insights: dir.join(INSIGHTS_FILE),
            creatives: dir.join(CREATIVES_FILE),
            report: dir.join(REPORT_FILE),
        }
    }
}

/// Overwrites the three artifacts in `dir`. Map ordering is fixed, so the same
/// outcome always produces the same bytes.
pub async fn write_artifacts(dir: &Path, outcome: &RunOutcome) -> Result<ArtifactPaths> {
    tokio::fs::create_dir_all(dir).await?;
    let paths = ArtifactPaths::in_dir(dir);

    tokio::fs::write(&paths.insights, pretty(&outcome.insights)?).await?;
    tokio::fs::write(&paths.creatives, pretty(&outcome.creatives)?).await?;
    tokio::fs::write(&paths.report, render_report(outcome, &paths)).await?;

    info!(
        dir = %dir.display(),
        campaigns = outcome.insights.len(),
        "[ARTIFACTS] wrote {}, {}, {}",
        INSIGHTS_FILE,
        CREATIVES_FILE,
        REPORT_FILE,
    );
    Ok(paths)
}

fn pretty<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let mut body = serde_json::to_vec_pretty(value)?;
    body.push(b'\n');
    Ok(body)
}
