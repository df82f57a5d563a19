use tracing::debug;

use crate::config::Config;
use crate::creative::templates::{render, templates_for};
use crate::types::{CampaignSeries, Evidence, Metric, Recommendation, ValidatedInsight};

/// Words of the first creative message used as the benefit phrase.
const BENEFIT_WORDS: usize = 5;
const DEFAULT_BENEFIT: &str = "Our product";

/// Turns validated insights into copy recommendations that name the issue.
#[derive(Debug, Clone)]
pub struct CreativeSynthesizer {
    confidence_threshold: f64,
}

impl CreativeSynthesizer {
    pub fn new(cfg: &Config) -> Self {
        Self {
            confidence_threshold: cfg.confidence_threshold,
        }
    }

    /// Empty unless the insight cleared the confidence gate.
    pub fn synthesize(
        &self,
        insight: &ValidatedInsight,
        series: &CampaignSeries,
    ) -> Vec<Recommendation> {
        if insight.confidence < self.confidence_threshold {
            return Vec::new();
        }
        let benefit = benefit_phrase(&series.creative_examples);
        let issue = describe_issue(&insight.hypothesis, &insight.evidence);

        let recs: Vec<Recommendation> = templates_for(insight.kind, insight.impact)
            .iter()
            .enumerate()
            .map(|(i, t)| Recommendation {
                id: format!("{}_{}", insight.id, i + 1),
                headline: render(t.headline, &benefit, &issue, t.cta, insight.impact),
                message: render(t.message, &benefit, &issue, t.cta, insight.impact),
                cta: t.cta.to_string(),
                rationale: render(t.rationale, &benefit, &issue, t.cta, insight.impact),
                linked_issue: insight.id.clone(),
            })
            .collect();

        debug!(
            campaign = %insight.campaign,
            insight = %insight.id,
            impact = %insight.impact,
            count = recs.len(),
            "[CREATIVE] {} recommendation(s) for {}",
            recs.len(),
            insight.id,
        );
        recs
    }
}

/// First words of the first creative example, or a neutral default.
pub fn benefit_phrase(examples: &[String]) -> String {
    let words: Vec<&str> = examples
        .first()
        .map(|m| m.split_whitespace().take(BENEFIT_WORDS).collect())
        .unwrap_or_default();
    if words.is_empty() {
        DEFAULT_BENEFIT.to_string()
    } else {
        words.join(" ")
    }
}

/// "ROAS decreased significantly vs baseline (2.37 → 1.58, -33.3%)"
pub fn describe_issue(statement: &str, ev: &Evidence) -> String {
    let pct = match ev.delta_pct {
        Some(p) => format!("{p:+.1}%"),
        None => "n/a".to_string(),
    };
    format!(
        "{statement} ({} → {}, {pct})",
        format_value(ev.metric, ev.pre),
        format_value(ev.metric, ev.post),
    )
}

pub fn format_value(metric: Metric, v: f64) -> String {
    match metric {
        Metric::Ctr => format!("{:.2}%", v * 100.0),
        Metric::Impressions | Metric::Clicks => format!("{v:.0}"),
        Metric::Roas | Metric::Spend | Metric::Revenue => format!("{v:.2}"),
    }
}
