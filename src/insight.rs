use tracing::{debug, info};

use crate::config::Config;
use crate::error::{AppError, Result};
use crate::series::{mean, pct_change, slope, split_pre_post};
use crate::types::{CampaignSeries, Hypothesis, HypothesisKind, Metric, Signal};

/// Derives candidate explanations from the shape of a campaign series.
/// Pure function of its input: same series, same hypotheses, same order.
#[derive(Debug, Clone)]
pub struct InsightGenerator {
    ctr_drop_pct: f64,
    spend_rise_pct: f64,
}

impl InsightGenerator {
    pub fn new(cfg: &Config) -> Self {
        Self {
            ctr_drop_pct: cfg.ctr_drop_pct,
            spend_rise_pct: cfg.spend_rise_pct,
        }
    }

    pub fn generate(&self, series: &CampaignSeries) -> Result<Vec<Hypothesis>> {
        if series.len() < 2 {
            return Err(AppError::HypothesisComputation {
                hypothesis: "*".to_string(),
                reason: format!("{} has {} point(s), need 2", series.campaign, series.len()),
            });
        }

        let roas = signal(series, Metric::Roas)?;
        let ctr = signal(series, Metric::Ctr)?;
        let impressions = signal(series, Metric::Impressions)?;
        let spend = signal(series, Metric::Spend)?;

        let roas_change = pct_change(roas.pre_mean, roas.post_mean);
        let ctr_change = pct_change(ctr.pre_mean, ctr.post_mean);
        let imps_change = pct_change(impressions.pre_mean, impressions.post_mean);
        let spend_change = pct_change(spend.pre_mean, spend.post_mean);
        let roas_fell = roas.post_mean < roas.pre_mean;
        let ctr_fell_hard = ctr_change.is_some_and(|c| c <= -self.ctr_drop_pct);

        let mut out = Vec::new();
        if roas_fell {
            out.push(Hypothesis::new(HypothesisKind::RoasDrop, &series.campaign, vec![roas.clone()])?);
        }
        if ctr_change.is_some_and(|c| c < -self.ctr_drop_pct) {
            out.push(Hypothesis::new(HypothesisKind::CtrDrop, &series.campaign, vec![ctr.clone()])?);
        }
        if ctr_fell_hard && imps_change.is_some_and(|c| c > 0.0) {
            out.push(Hypothesis::new(
                HypothesisKind::CreativeFatigue,
                &series.campaign,
                vec![ctr.clone(), impressions],
            )?);
        }
        if roas_fell && spend_change.is_some_and(|c| c > self.spend_rise_pct) {
            out.push(Hypothesis::new(
                HypothesisKind::SpendShift,
                &series.campaign,
                vec![roas, spend],
            )?);
        }

        debug!(
            campaign = %series.campaign,
            roas_change = ?roas_change,
            ctr_change = ?ctr_change,
            imps_change = ?imps_change,
            spend_change = ?spend_change,
            "[INSIGHT] signals",
        );
        info!(
            campaign = %series.campaign,
            hypotheses = out.len(),
            "[INSIGHT] {} -> [{}]",
            series.campaign,
            out.iter().map(|h| h.id.as_str()).collect::<Vec<_>>().join(", "),
        );
        Ok(out)
    }
}

fn signal(series: &CampaignSeries, metric: Metric) -> Result<Signal> {
    let values = series.values(metric);
    let (pre, post) = split_pre_post(&values);
    match (mean(pre), mean(post)) {
        (Some(pre_mean), Some(post_mean)) => Ok(Signal {
            metric,
            pre_mean,
            post_mean,
            slope: slope(&values),
        }),
        _ => Err(AppError::HypothesisComputation {
            hypothesis: "*".to_string(),
            reason: format!("{metric} window mean undefined for {}", series.campaign),
        }),
    }
}
