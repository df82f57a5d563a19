//! Wires the stages together: load, clean, plan, then per campaign
//! insight → evaluate → creative, and finally the artifacts.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Serialize;
use serde_json::json;
use tracing::{info, warn};

use crate::config::{Config, RETRY_BACKOFF_MS};
use crate::creative::CreativeSynthesizer;
use crate::error::{AppError, Result};
use crate::evaluator::Evaluator;
use crate::insight::InsightGenerator;
use crate::loader::load_table;
use crate::planner::{Plan, Planner, SelectedCampaign};
use crate::report::{write_artifacts, ArtifactPaths};
use crate::runlog::{execute, execute_async, RunLogger, RunMetrics, Stage, StageCall};
use crate::schema::{SchemaGuard, SchemaReport};
use crate::series::build_series;
use crate::summary::DataSummary;
use crate::types::{CampaignSeries, Recommendation, ValidatedInsight};

/// A hypothesis that was computed but not surfaced.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RejectedInsight {
    pub id: String,
    pub confidence: f64,
}

/// What happened to one selected campaign.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CampaignFinding {
    pub selection: SelectedCampaign,
    pub hypotheses: Vec<String>,
    pub rejected: Vec<RejectedInsight>,
    /// Hypothesis ids (or `*` for the whole campaign) whose computation failed.
    pub errors: Vec<String>,
}

/// Everything a finished run produced, in the order the report presents it.
#[derive(Debug, Clone, Serialize)]
pub struct RunOutcome {
    pub task: String,
    pub summary: DataSummary,
    pub schema: SchemaReport,
    pub plan: Plan,
    pub findings: Vec<CampaignFinding>,
    /// Campaign → surfaced insights. Campaigns with none are absent.
    pub insights: BTreeMap<String, Vec<ValidatedInsight>>,
    /// Campaign → recommendations. Same key set as `insights`.
    pub creatives: BTreeMap<String, Vec<Recommendation>>,
}

pub struct Pipeline {
    cfg: Config,
    guard: SchemaGuard,
    planner: Planner,
    generator: InsightGenerator,
    evaluator: Evaluator,
    synthesizer: CreativeSynthesizer,
}

impl Pipeline {
    pub fn new(cfg: Config) -> Self {
        Self {
            guard: SchemaGuard::new(cfg.cleaning_policy),
            planner: Planner::new(&cfg),
            generator: InsightGenerator::new(&cfg),
            evaluator: Evaluator::new(&cfg),
            synthesizer: CreativeSynthesizer::new(&cfg),
            cfg,
        }
    }

    /// Run every stage and write the artifacts. Returns only fatal errors;
    /// per-hypothesis failures are counted and skipped.
    pub async fn run(
        &self,
        logger: &mut RunLogger,
        metrics: &mut RunMetrics,
    ) -> Result<(RunOutcome, ArtifactPaths)> {
        let outcome = self.analyze(logger, metrics).await?;

        let out_dir = self.cfg.out_dir.as_path();
        let produced = &outcome;
        let paths = execute_async(
            logger,
            metrics,
            StageCall::new(Stage::Artifacts, json!({ "out_dir": out_dir.display().to_string() }))
                .attempts(self.cfg.retry_limit)
                .backoff(RETRY_BACKOFF_MS),
            |_| write_artifacts(out_dir, produced),
            |paths| json!(paths),
        )
        .await?;

        Ok((outcome, paths))
    }

    /// Everything up to, but not including, writing artifacts.
    pub async fn analyze(
        &self,
        logger: &mut RunLogger,
        metrics: &mut RunMetrics,
    ) -> Result<RunOutcome> {
        let input = self.cfg.input_path.as_path();
        let max_attempts = self.cfg.retry_limit;
        let (table, _) = execute_async(
            logger,
            metrics,
            StageCall::new(Stage::Load, json!({ "path": input.display().to_string() }))
                .attempts(max_attempts)
                .backoff(RETRY_BACKOFF_MS),
            |_| load_table(input),
            |(_, stats)| json!(stats),
        )
        .await
        .map_err(|e| AppError::Load {
            attempts: max_attempts,
            reason: e.to_string(),
        })?;
        metrics.counters.rows_loaded = table.rows.len();

        let (records, schema) = execute(
            logger,
            metrics,
            StageCall::new(
                Stage::Schema,
                json!({ "rows": table.rows.len(), "columns": table.headers }),
            ),
            |_| self.guard.validate(&table),
            |(_, report)| json!(report),
        )
        .await?;
        metrics.counters.rows_kept = schema.rows_kept;
        metrics.counters.rows_dropped = schema.rows_dropped;

        let summary = DataSummary::from_records(&records);
        info!(
            rows = summary.rows,
            campaigns = summary.campaigns_count,
            total_spend = summary.total_spend,
            avg_roas = summary.avg_roas,
            "[RUN] {} rows across {} campaign(s)",
            summary.rows,
            summary.campaigns_count,
        );

        let series = build_series(&records);
        metrics.counters.campaigns_scanned = series.len();

        let plan = execute(
            logger,
            metrics,
            StageCall::new(
                Stage::Plan,
                json!({ "task": self.cfg.task_text, "campaigns": series.len() }),
            ),
            |_| Ok(self.planner.plan(&self.cfg.task_text, &series)),
            |plan| json!(plan),
        )
        .await?;
        metrics.counters.campaigns_selected = plan.selected.len();

        let by_name: BTreeMap<&str, &CampaignSeries> =
            series.iter().map(|s| (s.campaign.as_str(), s)).collect();

        let mut findings = Vec::with_capacity(plan.selected.len());
        let mut insights = BTreeMap::new();
        let mut creatives = BTreeMap::new();

        for selection in &plan.selected {
            let Some(s) = by_name.get(selection.campaign.as_str()).copied() else {
                continue;
            };
            let (finding, validated, recs) =
                self.process_campaign(logger, metrics, selection, s).await;
            metrics.counters.campaigns_processed += 1;
            if !validated.is_empty() {
                insights.insert(s.campaign.clone(), validated);
                creatives.insert(s.campaign.clone(), recs);
            }
            findings.push(finding);
        }

        Ok(RunOutcome {
            task: self.cfg.task_text.clone(),
            summary,
            schema,
            plan,
            findings,
            insights,
            creatives,
        })
    }

    async fn process_campaign(
        &self,
        logger: &mut RunLogger,
        metrics: &mut RunMetrics,
        selection: &SelectedCampaign,
        series: &CampaignSeries,
    ) -> (CampaignFinding, Vec<ValidatedInsight>, Vec<Recommendation>) {
        let campaign = series.campaign.as_str();
        let mut finding = CampaignFinding {
            selection: selection.clone(),
            hypotheses: Vec::new(),
            rejected: Vec::new(),
            errors: Vec::new(),
        };

        let hypotheses = match execute(
            logger,
            metrics,
            StageCall::new(Stage::Insight, json!({ "campaign": campaign, "points": series.len() }))
                .scope(campaign),
            |_| self.generator.generate(series),
            |hs| json!(hs),
        )
        .await
        {
            Ok(hs) => hs,
            Err(e) => {
                warn!(campaign, error = %e, "[RUN] no hypotheses for {campaign}: {e}");
                metrics.counters.campaign_errors += 1;
                finding.errors.push("*".to_string());
                return (finding, Vec::new(), Vec::new());
            }
        };
        metrics.counters.hypotheses_generated += hypotheses.len();
        finding.hypotheses = hypotheses.iter().map(|h| h.id.clone()).collect();

        let mut validated = Vec::new();
        for h in &hypotheses {
            let scope = format!("{campaign}_{}", h.id);
            let result = execute(
                logger,
                metrics,
                StageCall::new(Stage::Evaluate, json!(h))
                    .scope(&scope)
                    .attempts(self.cfg.retry_limit),
                |attempt| self.evaluator.evaluate(h, series, attempt),
                |insight| json!(insight),
            )
            .await;
            match result {
                Ok(insight) if self.evaluator.passes(&insight) => {
                    metrics.counters.insights_validated += 1;
                    validated.push(insight);
                }
                Ok(insight) => {
                    info!(
                        campaign,
                        hypothesis = %insight.id,
                        confidence = insight.confidence,
                        "[RUN] {} below confidence threshold ({:.2})",
                        insight.id,
                        insight.confidence,
                    );
                    metrics.counters.low_confidence_rejections += 1;
                    finding.rejected.push(RejectedInsight {
                        id: insight.id,
                        confidence: insight.confidence,
                    });
                }
                Err(e) => {
                    warn!(campaign, hypothesis = %h.id, error = %e, "[RUN] skipping {}", h.id);
                    metrics.counters.hypothesis_errors += 1;
                    finding.errors.push(h.id.clone());
                }
            }
        }

        if validated.is_empty() {
            return (finding, validated, Vec::new());
        }

        let recs = execute(
            logger,
            metrics,
            StageCall::new(
                Stage::Creative,
                json!({ "insights": validated.iter().map(|i| &i.id).collect::<Vec<_>>() }),
            )
            .scope(campaign),
            |_| {
                Ok(validated
                    .iter()
                    .flat_map(|i| self.synthesizer.synthesize(i, series))
                    .collect::<Vec<_>>())
            },
            |recs| json!(recs),
        )
        .await
        .unwrap_or_default();
        metrics.counters.recommendations += recs.len();

        (finding, validated, recs)
    }
}

/// Resolve the input path: a CLI argument wins over the environment.
pub fn input_override(cfg: &mut Config, arg: Option<String>) {
    if let Some(path) = arg.filter(|a| !a.trim().is_empty()) {
        cfg.input_path = PathBuf::from(path);
    }
}

/// Fatal path: the error artifact, then metrics marked failed.
pub async fn record_failure(logger: &RunLogger, metrics: &mut RunMetrics, err: &AppError) {
    logger.write_error(err).await;
    metrics.fail(err.to_string());
    logger.write_metrics(&metrics.snapshot()).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::SelectionBasis;
    use crate::runlog::logger::{METRICS_FILE, RUN_ERROR_FILE, SCHEMA_ERROR_FILE};
    use crate::types::DailyPoint;
    use chrono::NaiveDate;
    use std::path::Path;

    fn read_json(path: &Path) -> serde_json::Value {
        serde_json::from_slice(&std::fs::read(path).unwrap()).unwrap()
    }

    const HEADER: &str = "campaign_name,adset_name,date,spend,impressions,clicks,ctr,purchases,revenue,roas,creative_type,creative_message,audience_type";

    /// Ten days per campaign. `declining` drops ROAS from 2.37 to 1.58 at day 6;
    /// `flat` holds ROAS at 2.0 throughout.
    fn sample_csv() -> String {
        let pre = [2.35, 2.40, 2.38, 2.36, 2.36];
        let post = [1.60, 1.55, 1.58, 1.59, 1.58];
        let mut out = String::from(HEADER);
        out.push('\n');
        for (i, roas) in pre.iter().chain(post.iter()).enumerate() {
            let day = i + 1;
            let revenue = 100.0 * roas;
            out.push_str(&format!(
                "declining,set-a,2025-03-{day:02},100,1000,20,0.02,3,{revenue:.2},{roas},image,\"Fresh coffee delivered to your door, daily\",broad\n"
            ));
            out.push_str(&format!(
                "flat,set-b,2025-03-{day:02},50,800,16,0.02,2,100,2.0,video,Stay cool all summer,lookalike\n"
            ));
        }
        out
    }

    /// Drops the `roas` cell (index 9) from every line.
    fn without_roas(csv: &str) -> String {
        csv.lines()
            .map(|line| {
                let mut cells: Vec<&str> = line.split(',').collect();
                cells.remove(9);
                cells.join(",")
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn config(root: &Path, input: &Path) -> Config {
        Config {
            input_path: input.to_path_buf(),
            out_dir: root.join("reports"),
            log_dir: root.join("logs"),
            ..Config::default()
        }
    }

    async fn run_once(root: &Path, input: &Path) -> Result<(RunOutcome, ArtifactPaths)> {
        let cfg = config(root, input);
        let mut logger = RunLogger::new(cfg.log_dir.clone());
        let mut metrics = RunMetrics::new();
        Pipeline::new(cfg).run(&mut logger, &mut metrics).await
    }

    #[tokio::test]
    async fn declining_campaign_yields_linked_recommendations() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("sample.csv");
        std::fs::write(&input, sample_csv()).unwrap();

        let (outcome, _) = run_once(dir.path(), &input).await.unwrap();

        assert_eq!(outcome.plan.campaigns().collect::<Vec<_>>(), vec!["declining"]);
        assert!(!outcome.insights.contains_key("flat"));
        assert!(!outcome.creatives.contains_key("flat"));

        let insights = &outcome.insights["declining"];
        let roas = insights.iter().find(|i| i.id == "h_roas_drop").unwrap();
        assert_eq!(roas.impact, crate::types::ImpactTier::High);
        assert!(roas.confidence >= 0.5);

        let recs = &outcome.creatives["declining"];
        assert!(recs.iter().any(|r| r.message.contains("ROAS decreased")));
        for r in recs {
            assert!(insights.iter().any(|i| i.id == r.linked_issue), "orphan {}", r.id);
        }
    }

    #[tokio::test]
    async fn identical_input_gives_identical_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("sample.csv");
        std::fs::write(&input, sample_csv()).unwrap();

        let (_, first) = run_once(&dir.path().join("a"), &input).await.unwrap();
        let (_, second) = run_once(&dir.path().join("b"), &input).await.unwrap();

        for (a, b) in [(&first.insights, &second.insights), (&first.creatives, &second.creatives)] {
            assert_eq!(std::fs::read(a).unwrap(), std::fs::read(b).unwrap());
        }
    }

    #[tokio::test]
    async fn missing_roas_column_is_fatal_and_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("no_roas.csv");
        std::fs::write(&input, without_roas(&sample_csv())).unwrap();

        let err = run_once(dir.path(), &input).await.unwrap_err();
        match &err {
            AppError::Schema(v) => assert_eq!(v.missing, vec!["roas".to_string()]),
            other => panic!("expected schema error, got {other}"),
        }
        assert!(err.is_fatal());
        assert!(!dir.path().join("reports").join("insights.json").exists());
        assert!(!dir.path().join("reports").join("creatives.json").exists());
    }

    #[tokio::test]
    async fn schema_failure_leaves_error_and_failed_metrics() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("no_roas.csv");
        std::fs::write(&input, without_roas(&sample_csv())).unwrap();

        let cfg = config(dir.path(), &input);
        let mut logger = RunLogger::new(cfg.log_dir.clone());
        let mut metrics = RunMetrics::new();
        let err = Pipeline::new(cfg).run(&mut logger, &mut metrics).await.unwrap_err();
        record_failure(&logger, &mut metrics, &err).await;

        let logs = dir.path().join("logs");
        let schema = read_json(&logs.join(SCHEMA_ERROR_FILE));
        assert_eq!(schema["error"], "schema_error");
        assert!(schema["missing_columns"]
            .as_array()
            .unwrap()
            .iter()
            .any(|c| c == "roas"));

        let run = read_json(&logs.join(METRICS_FILE));
        assert_eq!(run["status"], "failed");
        assert!(run["fatal_error"].as_str().unwrap().contains("roas"));
        assert!(!logs.join(RUN_ERROR_FILE).exists());
        assert!(!dir.path().join("reports").join("insights.json").exists());
    }

    #[tokio::test]
    async fn config_failure_writes_run_error() {
        let dir = tempfile::tempdir().unwrap();
        let env = |key: &str| match key {
            "LOG_DIR" => Some(dir.path().join("logs").display().to_string()),
            "RETRY_LIMIT" => Some("0".to_string()),
            _ => None,
        };
        let err = Config::from_lookup(env).unwrap_err();

        let logger = RunLogger::new(crate::config::log_dir_from(&env));
        record_failure(&logger, &mut RunMetrics::new(), &err).await;

        let run_error = read_json(&dir.path().join("logs").join(RUN_ERROR_FILE));
        assert_eq!(run_error["error"], "config_error");
        assert!(run_error["message"].as_str().unwrap().contains("RETRY_LIMIT"));
        let run = read_json(&dir.path().join("logs").join(METRICS_FILE));
        assert_eq!(run["status"], "failed");
    }

    #[tokio::test]
    async fn too_short_series_counts_as_a_campaign_error() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = Pipeline::new(Config::default());
        let mut logger = RunLogger::new(dir.path());
        let mut metrics = RunMetrics::new();

        let point = DailyPoint {
            date: NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
            spend: 100.0,
            impressions: 1000.0,
            clicks: 20.0,
            purchases: 2.0,
            revenue: 200.0,
            ctr: 0.02,
            roas: 2.0,
            rows: 1,
        };
        let series = CampaignSeries {
            campaign: "one_day".to_string(),
            points: vec![point],
            adsets: Vec::new(),
            creative_examples: Vec::new(),
        };
        let selection = SelectedCampaign {
            campaign: "one_day".to_string(),
            basis: SelectionBasis::AbsoluteDrop,
            points: 1,
            pre_roas: 2.0,
            post_roas: 1.0,
            drop_pct: None,
            abs_drop: 1.0,
            severity: 1.0,
        };

        let (finding, validated, recs) = pipeline
            .process_campaign(&mut logger, &mut metrics, &selection, &series)
            .await;

        assert_eq!(finding.errors, vec!["*".to_string()]);
        assert!(validated.is_empty() && recs.is_empty());
        let c = &metrics.counters;
        assert_eq!(c.campaign_errors, 1);
        assert_eq!(c.hypotheses_generated, 0);
        assert_eq!(c.hypothesis_errors, 0);
        assert_eq!(
            c.hypotheses_generated,
            c.insights_validated + c.low_confidence_rejections + c.hypothesis_errors
        );
    }

    #[tokio::test]
    async fn missing_input_is_a_load_error_after_retries() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = Config {
            retry_limit: 2,
            ..config(dir.path(), &dir.path().join("absent.csv"))
        };
        let mut logger = RunLogger::new(cfg.log_dir.clone());
        let mut metrics = RunMetrics::new();
        let err = Pipeline::new(cfg).run(&mut logger, &mut metrics).await.unwrap_err();

        assert!(matches!(err, AppError::Load { attempts: 2, .. }));
        assert_eq!(metrics.snapshot().stages[&Stage::Load].attempts, 2);
    }

    #[tokio::test]
    async fn counters_track_every_stage() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("sample.csv");
        std::fs::write(&input, sample_csv()).unwrap();

        let cfg = config(dir.path(), &input);
        let mut logger = RunLogger::new(cfg.log_dir.clone());
        let mut metrics = RunMetrics::new();
        let (outcome, _) = Pipeline::new(cfg).run(&mut logger, &mut metrics).await.unwrap();

        let c = &metrics.counters;
        assert_eq!(c.rows_loaded, 20);
        assert_eq!(c.rows_kept, 20);
        assert_eq!(c.campaigns_scanned, 2);
        assert_eq!(c.campaigns_selected, 1);
        assert_eq!(c.campaigns_processed, 1);
        assert_eq!(
            c.hypotheses_generated,
            c.insights_validated + c.low_confidence_rejections + c.hypothesis_errors
        );
        assert_eq!(c.recommendations, outcome.creatives["declining"].len());
        assert!(dir.path().join("logs").join("001_load.json").exists());
    }

    #[test]
    fn cli_argument_overrides_input_path() {
        let mut cfg = Config::default();
        input_override(&mut cfg, Some("other.csv".to_string()));
        assert_eq!(cfg.input_path, PathBuf::from("other.csv"));
        input_override(&mut cfg, None);
        assert_eq!(cfg.input_path, PathBuf::from("other.csv"));
    }
}
