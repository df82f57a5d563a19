use tracing::debug;

use crate::config::{Config, FULL_CONFIDENCE_SAMPLES};
use crate::error::{AppError, Result};
use crate::evaluator::stats::mann_whitney_p;
use crate::series::{mean, pct_change, split_pre_post};
use crate::types::{
    CampaignSeries, Direction, Evidence, Hypothesis, ImpactTier, Metric, ValidatedInsight,
};

/// Re-derives each hypothesis from its source series and attaches evidence,
/// impact and confidence.
#[derive(Debug, Clone)]
pub struct Evaluator {
    confidence_threshold: f64,
    impact_medium_pct: f64,
    impact_high_pct: f64,
}

impl Evaluator {
    pub fn new(cfg: &Config) -> Self {
        Self {
            confidence_threshold: cfg.confidence_threshold,
            impact_medium_pct: cfg.impact_medium_pct,
            impact_high_pct: cfg.impact_high_pct,
        }
    }

    /// Insights below the threshold are not surfaced.
    pub fn passes(&self, insight: &ValidatedInsight) -> bool {
        insight.confidence >= self.confidence_threshold
    }

    /// Validate one hypothesis. `attempt` > 1 evaluates the sanitized fallback
    /// series, where any non-finite value reads as zero.
    pub fn evaluate(
        &self,
        hypothesis: &Hypothesis,
        series: &CampaignSeries,
        attempt: u32,
    ) -> Result<ValidatedInsight> {
        if hypothesis.campaign != series.campaign {
            return Err(computation_error(
                hypothesis,
                format!("series belongs to {}, not {}", series.campaign, hypothesis.campaign),
            ));
        }
        let fallback = attempt > 1;

        let primary = hypothesis.kind.primary_metric();
        let evidence = self.evidence(hypothesis, series, primary, fallback)?;
        let mut consistent = matches_direction(&evidence, Direction::Down);

        let mut supporting = Vec::new();
        for (metric, expected) in hypothesis.kind.supporting_metrics() {
            let ev = self.evidence(hypothesis, series, *metric, fallback)?;
            consistent &= matches_direction(&ev, *expected);
            supporting.push(ev);
        }

        let impact = ImpactTier::from_delta_pct(
            evidence.delta_pct,
            self.impact_medium_pct,
            self.impact_high_pct,
        );
        let confidence = if consistent {
            self.confidence(series.len(), evidence.delta_pct)
        } else {
            0.0
        };

        debug!(
            campaign = %hypothesis.campaign,
            hypothesis = %hypothesis.id,
            pre = evidence.pre,
            post = evidence.post,
            delta_pct = ?evidence.delta_pct,
            p_value = evidence.p_value,
            impact = %impact,
            confidence,
            fallback,
            "[EVAL] scored",
        );

        Ok(ValidatedInsight {
            id: hypothesis.id.clone(),
            kind: hypothesis.kind,
            campaign: hypothesis.campaign.clone(),
            hypothesis: hypothesis.statement.clone(),
            segment: hypothesis.segment.clone(),
            evidence,
            supporting,
            impact,
            confidence,
        })
    }

    fn evidence(
        &self,
        hypothesis: &Hypothesis,
        series: &CampaignSeries,
        metric: Metric,
        fallback: bool,
    ) -> Result<Evidence> {
        let mut values = series.values(metric);
        if fallback {
            for v in values.iter_mut().filter(|v| !v.is_finite()) {
                *v = 0.0;
            }
        }
        if values.len() < 2 {
            return Err(computation_error(
                hypothesis,
                format!("degenerate split: {} point(s)", values.len()),
            ));
        }
        let (pre, post) = split_pre_post(&values);
        let (Some(pre_mean), Some(post_mean)) = (mean(pre), mean(post)) else {
            return Err(computation_error(
                hypothesis,
                format!("{metric} window mean is not finite"),
            ));
        };
        Ok(Evidence {
            metric,
            pre: pre_mean,
            post: post_mean,
            delta_abs: post_mean - pre_mean,
            delta_pct: pct_change(pre_mean, post_mean),
            p_value: mann_whitney_p(pre, post),
            n_pre: pre.len(),
            n_post: post.len(),
        })
    }

    /// Sample-size factor times shift-magnitude factor, in [0, 1].
    /// An undefined percentage carries no magnitude.
    fn confidence(&self, points: usize, delta_pct: Option<f64>) -> f64 {
        let Some(pct) = delta_pct else {
            return 0.0;
        };
        let sample = (points as f64 / FULL_CONFIDENCE_SAMPLES as f64).min(1.0);
        let magnitude = if self.impact_high_pct > 0.0 {
            (pct.abs() / self.impact_high_pct).min(1.0)
        } else {
            1.0
        };
        (sample * magnitude).clamp(0.0, 1.0)
    }
}

fn matches_direction(ev: &Evidence, expected: Direction) -> bool {
    match expected {
        Direction::Down => ev.delta_abs < 0.0,
        Direction::Up => ev.delta_abs > 0.0,
    }
}

fn computation_error(hypothesis: &Hypothesis, reason: String) -> AppError {
    AppError::HypothesisComputation {
        hypothesis: format!("{}/{}", hypothesis.campaign, hypothesis.id),
        reason,
    }
}
