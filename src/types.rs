use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

// ---------------------------------------------------------------------------
// Input records
// ---------------------------------------------------------------------------

/// One cleaned row of daily campaign/adset performance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub campaign_name: String,
    pub adset_name: String,
    pub date: NaiveDate,
    pub spend: f64,
    pub impressions: f64,
    pub clicks: f64,
    pub ctr: f64,
    pub purchases: f64,
    pub revenue: f64,
    pub roas: f64,
    pub creative_type: String,
    pub creative_message: String,
    pub audience_type: String,
}

// ---------------------------------------------------------------------------
// Metrics
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    Roas,
    Ctr,
    Spend,
    Impressions,
    Clicks,
    Revenue,
}

impl Metric {
    /// Label used in recommendation and report text.
    pub fn label(&self) -> &'static str {
        match self {
            Metric::Roas => "ROAS",
            Metric::Ctr => "CTR",
            Metric::Spend => "Spend",
            Metric::Impressions => "Impressions",
            Metric::Clicks => "Clicks",
            Metric::Revenue => "Revenue",
        }
    }
}

impl std::fmt::Display for Metric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Metric::Roas => "roas",
            Metric::Ctr => "ctr",
            Metric::Spend => "spend",
            Metric::Impressions => "impressions",
            Metric::Clicks => "clicks",
            Metric::Revenue => "revenue",
        };
        write!(f, "{s}")
    }
}

// ---------------------------------------------------------------------------
// Campaign series
// ---------------------------------------------------------------------------

/// All of one campaign's records for a single date, summed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyPoint {
    pub date: NaiveDate,
    pub spend: f64,
    pub impressions: f64,
    pub clicks: f64,
    pub purchases: f64,
    pub revenue: f64,
    /// clicks / impressions, or the mean reported CTR when impressions are zero.
    pub ctr: f64,
    /// revenue / spend, or the mean reported ROAS when spend is zero.
    pub roas: f64,
    pub rows: usize,
}

impl DailyPoint {
    pub fn metric(&self, metric: Metric) -> f64 {
        match metric {
            Metric::Roas => self.roas,
            Metric::Ctr => self.ctr,
            Metric::Spend => self.spend,
            Metric::Impressions => self.impressions,
            Metric::Clicks => self.clicks,
            Metric::Revenue => self.revenue,
        }
    }
}

/// Date-ascending daily series for one campaign.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CampaignSeries {
    pub campaign: String,
    pub points: Vec<DailyPoint>,
    pub adsets: Vec<String>,
    /// Distinct creative messages in date order, capped for the synthesizer.
    pub creative_examples: Vec<String>,
}

impl CampaignSeries {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn values(&self, metric: Metric) -> Vec<f64> {
        self.points.iter().map(|p| p.metric(metric)).collect()
    }
}

// ---------------------------------------------------------------------------
// Hypotheses
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HypothesisKind {
    RoasDrop,
    CtrDrop,
    CreativeFatigue,
    SpendShift,
}

impl HypothesisKind {
    /// Stable identifier; also the `linked_issue` of recommendations.
    pub fn id(&self) -> &'static str {
        match self {
            HypothesisKind::RoasDrop => "h_roas_drop",
            HypothesisKind::CtrDrop => "h_ctr_drop",
            HypothesisKind::CreativeFatigue => "h_fatigue",
            HypothesisKind::SpendShift => "h_spend_shift",
        }
    }

    pub fn statement(&self) -> &'static str {
        match self {
            HypothesisKind::RoasDrop => "ROAS decreased significantly vs baseline",
            HypothesisKind::CtrDrop => "CTR decreased significantly vs baseline",
            HypothesisKind::CreativeFatigue => {
                "Possible creative fatigue (impressions up, CTR down)"
            }
            HypothesisKind::SpendShift => "ROAS fell while spend rose (spend/mix shift)",
        }
    }

    /// Metric the evaluator validates; drives impact and confidence.
    pub fn primary_metric(&self) -> Metric {
        match self {
            HypothesisKind::RoasDrop | HypothesisKind::SpendShift => Metric::Roas,
            HypothesisKind::CtrDrop | HypothesisKind::CreativeFatigue => Metric::Ctr,
        }
    }

    /// Secondary metrics and the direction each is expected to move.
    pub fn supporting_metrics(&self) -> &'static [(Metric, Direction)] {
        match self {
            HypothesisKind::RoasDrop | HypothesisKind::CtrDrop => &[],
            HypothesisKind::CreativeFatigue => &[(Metric::Impressions, Direction::Up)],
            HypothesisKind::SpendShift => &[(Metric::Spend, Direction::Up)],
        }
    }

    /// Every metric a hypothesis of this kind must carry a signal for.
    pub fn required_metrics(&self) -> Vec<Metric> {
        let mut metrics = vec![self.primary_metric()];
        metrics.extend(self.supporting_metrics().iter().map(|(m, _)| *m));
        metrics
    }
}

impl std::fmt::Display for HypothesisKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            HypothesisKind::RoasDrop => "roas_drop",
            HypothesisKind::CtrDrop => "ctr_drop",
            HypothesisKind::CreativeFatigue => "creative_fatigue",
            HypothesisKind::SpendShift => "spend_shift",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
}

/// Raw directional evidence a hypothesis was derived from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Signal {
    pub metric: Metric,
    pub pre_mean: f64,
    pub post_mean: f64,
    /// Least-squares slope per day over the whole series.
    pub slope: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Hypothesis {
    pub id: String,
    pub kind: HypothesisKind,
    pub campaign: String,
    pub statement: String,
    pub segment: String,
    pub signals: Vec<Signal>,
}

impl Hypothesis {
    /// Fails unless `signals` covers every metric the kind requires.
    pub fn new(kind: HypothesisKind, campaign: &str, signals: Vec<Signal>) -> Result<Self> {
        let missing: Vec<String> = kind
            .required_metrics()
            .into_iter()
            .filter(|m| !signals.iter().any(|s| s.metric == *m))
            .map(|m| m.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(AppError::HypothesisComputation {
                hypothesis: kind.id().to_string(),
                reason: format!("missing signal for {}", missing.join(", ")),
            });
        }
        if let Some(bad) = signals
            .iter()
            .find(|s| !(s.pre_mean.is_finite() && s.post_mean.is_finite() && s.slope.is_finite()))
        {
            return Err(AppError::HypothesisComputation {
                hypothesis: kind.id().to_string(),
                reason: format!("non-finite {} signal", bad.metric),
            });
        }
        Ok(Self {
            id: kind.id().to_string(),
            kind,
            campaign: campaign.to_string(),
            statement: kind.statement().to_string(),
            segment: "overall".to_string(),
            signals,
        })
    }
}

// ---------------------------------------------------------------------------
// Validated insights
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImpactTier {
    /// |delta| below the medium boundary, or undefined
    Low,
    /// |delta| between the medium and high boundaries
    Medium,
    /// |delta| above the high boundary
    High,
}

impl ImpactTier {
    pub fn from_delta_pct(delta_pct: Option<f64>, medium_pct: f64, high_pct: f64) -> Self {
        let Some(pct) = delta_pct else {
            return ImpactTier::Low;
        };
        let magnitude = pct.abs();
        if magnitude < medium_pct {
            ImpactTier::Low
        } else if magnitude <= high_pct {
            ImpactTier::Medium
        } else {
            ImpactTier::High
        }
    }
}

impl std::fmt::Display for ImpactTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ImpactTier::Low => "low",
            ImpactTier::Medium => "medium",
            ImpactTier::High => "high",
        };
        write!(f, "{s}")
    }
}

/// Pre/post comparison of one metric.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Evidence {
    pub metric: Metric,
    pub pre: f64,
    pub post: f64,
    pub delta_abs: f64,
    /// Percent change vs pre; `None` when pre is zero.
    pub delta_pct: Option<f64>,
    /// Two-sided Mann-Whitney U p-value, pre vs post.
    pub p_value: f64,
    pub n_pre: usize,
    pub n_post: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidatedInsight {
    pub id: String,
    pub kind: HypothesisKind,
    pub campaign: String,
    pub hypothesis: String,
    pub segment: String,
    pub evidence: Evidence,
    pub supporting: Vec<Evidence>,
    pub impact: ImpactTier,
    pub confidence: f64,
}

// ---------------------------------------------------------------------------
// Recommendations
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recommendation {
    pub id: String,
    pub headline: String,
    pub message: String,
    pub cta: String,
    pub rationale: String,
    /// Id of the validated insight this recommendation answers.
    pub linked_issue: String,
}
