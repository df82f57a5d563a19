mod config;
mod creative;
mod error;
mod evaluator;
mod insight;
mod loader;
mod pipeline;
mod planner;
mod report;
mod runlog;
mod schema;
mod series;
mod summary;
mod types;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::config::{log_dir_from, Config};
use crate::error::Result;
use crate::pipeline::{input_override, record_failure, Pipeline};
use crate::report::markdown::headline_finding;
use crate::runlog::{RunLogger, RunMetrics};

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let mut cfg = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Config error: {e}");
            let logger = RunLogger::new(log_dir_from(&|key: &str| std::env::var(key).ok()));
            record_failure(&logger, &mut RunMetrics::new(), &e).await;
            std::process::exit(1);
        }
    };
    input_override(&mut cfg, std::env::args().nth(1));

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cfg.log_level))
        .init();

    if let Err(e) = run(cfg).await {
        error!("Fatal error: {e}");
        std::process::exit(1);
    }
}

async fn run(cfg: Config) -> Result<()> {
    info!(
        input = %cfg.input_path.display(),
        policy = %cfg.cleaning_policy,
        "[RUN] starting: {}",
        cfg.task_text,
    );
    let mut logger = RunLogger::new(cfg.log_dir.clone());
    let mut metrics = RunMetrics::new();

    let result = Pipeline::new(cfg).run(&mut logger, &mut metrics).await;
    match result {
        Ok((outcome, paths)) => {
            metrics.succeed();
            logger.write_metrics(&metrics.snapshot()).await;
            info!(
                campaigns = ?outcome.plan.campaigns().collect::<Vec<_>>(),
                "[RUN] analyzed {} campaign(s)",
                outcome.findings.len(),
            );
            if let Some(line) = headline_finding(&outcome) {
                info!("[RUN] top finding: {line}");
            }
            let c = &metrics.counters;
            info!(
                selected = c.campaigns_selected,
                insights = c.insights_validated,
                rejected = c.low_confidence_rejections,
                errors = c.hypothesis_errors,
                campaign_errors = c.campaign_errors,
                recommendations = c.recommendations,
                "[RUN] done. Reports written to {}, logs to {}",
                paths.report.parent().map(|p| p.display().to_string()).unwrap_or_default(),
                logger.log_dir().display(),
            );
            Ok(())
        }
        Err(e) => {
            record_failure(&logger, &mut metrics, &e).await;
            Err(e)
        }
    }
}
