use serde::Serialize;
use tracing::{debug, info};

use crate::config::Config;
use crate::series::{mean, split_pre_post, variance};
use crate::types::{CampaignSeries, Metric};

/// How a campaign qualified for analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionBasis {
    /// ROAS fell by more than the configured percentage.
    PercentDrop,
    /// Percentage undefined (zero baseline or flat series); absolute drop used instead.
    AbsoluteDrop,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SelectedCampaign {
    pub campaign: String,
    pub basis: SelectionBasis,
    pub points: usize,
    pub pre_roas: f64,
    pub post_roas: f64,
    /// Positive for a decline. `None` when the baseline is zero or the series is flat.
    pub drop_pct: Option<f64>,
    pub abs_drop: f64,
    /// Ranking key: `drop_pct` for percent selections, `abs_drop` otherwise.
    pub severity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SkipReason {
    TooShort { points: usize, required: usize },
    NoDecline { drop_pct: Option<f64> },
    BelowThreshold { drop_pct: f64 },
    Capped,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedCampaign {
    pub campaign: String,
    #[serde(flatten)]
    pub reason: SkipReason,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Plan {
    pub task: String,
    pub selected: Vec<SelectedCampaign>,
    pub skipped: Vec<SkippedCampaign>,
}

impl Plan {
    pub fn campaigns(&self) -> impl Iterator<Item = &str> {
        self.selected.iter().map(|s| s.campaign.as_str())
    }
}

/// Selects campaigns whose ROAS declined between the pre and post windows.
#[derive(Debug, Clone)]
pub struct Planner {
    min_series_len: usize,
    decline_threshold_pct: f64,
    min_abs_drop: f64,
    max_campaigns: usize,
}

impl Planner {
    pub fn new(cfg: &Config) -> Self {
        Self {
            min_series_len: cfg.min_series_len,
            decline_threshold_pct: cfg.decline_threshold_pct,
            min_abs_drop: cfg.min_abs_drop,
            max_campaigns: cfg.max_campaigns,
        }
    }

    pub fn plan(&self, task: &str, series: &[CampaignSeries]) -> Plan {
        let mut selected = Vec::new();
        let mut skipped = Vec::new();

        for s in series {
            match self.assess(s) {
                Ok(sel) => selected.push(sel),
                Err(reason) => {
                    debug!(campaign = %s.campaign, ?reason, "[PLAN] skipped");
                    skipped.push(SkippedCampaign {
                        campaign: s.campaign.clone(),
                        reason,
                    });
                }
            }
        }

        rank(&mut selected);

        if self.max_campaigns > 0 && selected.len() > self.max_campaigns {
            for dropped in selected.split_off(self.max_campaigns) {
                skipped.push(SkippedCampaign {
                    campaign: dropped.campaign,
                    reason: SkipReason::Capped,
                });
            }
        }

        for sel in &selected {
            info!(
                campaign = %sel.campaign,
                basis = ?sel.basis,
                pre_roas = sel.pre_roas,
                post_roas = sel.post_roas,
                severity = sel.severity,
                "[PLAN] selected {} | ROAS {:.3} -> {:.3}",
                sel.campaign,
                sel.pre_roas,
                sel.post_roas,
            );
        }
        info!(
            selected = selected.len(),
            skipped = skipped.len(),
            "[PLAN] {} of {} campaign(s) selected",
            selected.len(),
            series.len(),
        );

        Plan {
            task: task.to_string(),
            selected,
            skipped,
        }
    }

    fn assess(&self, s: &CampaignSeries) -> Result<SelectedCampaign, SkipReason> {
        let points = s.len();
        if points < self.min_series_len {
            return Err(SkipReason::TooShort {
                points,
                required: self.min_series_len,
            });
        }

        let roas = s.values(Metric::Roas);
        let (pre, post) = split_pre_post(&roas);
        let (Some(pre_roas), Some(post_roas)) = (mean(pre), mean(post)) else {
            return Err(SkipReason::TooShort {
                points,
                required: self.min_series_len,
            });
        };
        let abs_drop = pre_roas - post_roas;
        let flat = variance(&roas).is_some_and(|v| v == 0.0);

        if pre_roas > 0.0 && !flat {
            let drop_pct = abs_drop / pre_roas * 100.0;
            if drop_pct <= 0.0 {
                return Err(SkipReason::NoDecline { drop_pct: Some(drop_pct) });
            }
            if drop_pct <= self.decline_threshold_pct {
                return Err(SkipReason::BelowThreshold { drop_pct });
            }
            return Ok(SelectedCampaign {
                campaign: s.campaign.clone(),
                basis: SelectionBasis::PercentDrop,
                points,
                pre_roas,
                post_roas,
                drop_pct: Some(drop_pct),
                abs_drop,
                severity: drop_pct,
            });
        }

        // Reached with a non-positive baseline or a flat series. Cleaned
        // data is non-negative, so in practice only a negative baseline fires.
        if abs_drop > 0.0 && abs_drop >= self.min_abs_drop {
            return Ok(SelectedCampaign {
                campaign: s.campaign.clone(),
                basis: SelectionBasis::AbsoluteDrop,
                points,
                pre_roas,
                post_roas,
                drop_pct: None,
                abs_drop,
                severity: abs_drop,
            });
        }
        Err(SkipReason::NoDecline { drop_pct: None })
    }
}

/// Percent selections first, then absolute ones; each by severity descending, then name.
fn rank(selected: &mut [SelectedCampaign]) {
    selected.sort_by(|a, b| {
        a.basis
            .cmp(&b.basis)
            .then_with(|| b.severity.total_cmp(&a.severity))
            .then_with(|| a.campaign.cmp(&b.campaign))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DailyPoint;
    use chrono::NaiveDate;

    fn series(name: &str, roas: &[f64]) -> CampaignSeries {
        CampaignSeries {
            campaign: name.to_string(),
            points: roas
                .iter()
                .enumerate()
                .map(|(i, r)| DailyPoint {
                    date: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap() + chrono::Days::new(i as u64),
                    spend: 100.0,
                    impressions: 1000.0,
                    clicks: 20.0,
                    purchases: 2.0,
                    revenue: 100.0 * r,
                    ctr: 0.02,
                    roas: *r,
                    rows: 1,
                })
                .collect(),
            adsets: Vec::new(),
            creative_examples: Vec::new(),
        }
    }

    fn planner() -> Planner {
        Planner::new(&Config::default())
    }

    #[test]
    fn selects_and_ranks_by_drop() {
        let all = vec![
            series("mild", &[2.0, 2.0, 1.7, 1.7]),
            series("steep", &[2.0, 2.0, 1.0, 1.0]),
            series("rising", &[1.0, 1.0, 2.0, 2.0]),
        ];
        let plan = planner().plan("task", &all);
        let names: Vec<&str> = plan.campaigns().collect();
        assert_eq!(names, vec!["steep", "mild"]);
        assert!((plan.selected[0].drop_pct.unwrap() - 50.0).abs() < 1e-9);
        assert_eq!(plan.skipped.len(), 1);
        assert!(matches!(plan.skipped[0].reason, SkipReason::NoDecline { .. }));
    }

    #[test]
    fn short_and_below_threshold_series_are_skipped() {
        let all = vec![
            series("short", &[3.0, 1.0]),
            series("small", &[2.0, 2.0, 1.9, 1.9]),
        ];
        let plan = planner().plan("task", &all);
        assert!(plan.selected.is_empty());
        assert!(matches!(plan.skipped[0].reason, SkipReason::TooShort { points: 2, .. }));
        assert!(matches!(plan.skipped[1].reason, SkipReason::BelowThreshold { .. }));
    }

    #[test]
    fn flat_series_is_never_selected() {
        let plan = planner().plan("task", &[series("flat", &[2.0; 10])]);
        assert!(plan.selected.is_empty());
        assert_eq!(plan.skipped[0].reason, SkipReason::NoDecline { drop_pct: None });
    }

    #[test]
    fn zero_baseline_uses_absolute_fallback() {
        let cfg = Config { min_abs_drop: 0.0, ..Config::default() };
        let plan = Planner::new(&cfg).plan("task", &[series("zero", &[0.0, 0.0, 0.0, 0.0])]);
        assert!(plan.selected.is_empty());

        // A baseline that averages to zero can only rise; the fallback never fires here.
        let plan = planner().plan("task", &[series("up", &[0.0, 0.0, 1.0, 1.0])]);
        assert!(plan.selected.is_empty());
    }

    #[test]
    fn negative_baseline_is_selected_on_absolute_drop() {
        let plan = planner().plan("task", &[series("refunds", &[-1.0, -1.0, -2.0, -2.0])]);
        assert_eq!(plan.selected.len(), 1);
        let sel = &plan.selected[0];
        assert_eq!(sel.basis, SelectionBasis::AbsoluteDrop);
        assert_eq!(sel.drop_pct, None);
        assert_eq!(sel.abs_drop, 1.0);
        assert_eq!(sel.severity, 1.0);

        // Below the absolute floor it is skipped instead.
        let plan = planner().plan("task", &[series("tiny", &[-1.0, -1.0, -1.05, -1.05])]);
        assert!(plan.selected.is_empty());
        assert_eq!(plan.skipped[0].reason, SkipReason::NoDecline { drop_pct: None });
    }

    #[test]
    fn percent_selections_rank_before_absolute_ones() {
        let abs = SelectedCampaign {
            campaign: "abs".to_string(),
            basis: SelectionBasis::AbsoluteDrop,
            points: 4,
            pre_roas: 1.0,
            post_roas: 0.0,
            drop_pct: None,
            abs_drop: 50.0,
            severity: 50.0,
        };
        let pct_small = SelectedCampaign {
            campaign: "pct_small".to_string(),
            basis: SelectionBasis::PercentDrop,
            drop_pct: Some(12.0),
            severity: 12.0,
            ..abs.clone()
        };
        let pct_big = SelectedCampaign {
            campaign: "pct_big".to_string(),
            severity: 40.0,
            drop_pct: Some(40.0),
            ..pct_small.clone()
        };
        let mut v = vec![abs, pct_small, pct_big];
        rank(&mut v);
        let names: Vec<&str> = v.iter().map(|s| s.campaign.as_str()).collect();
        assert_eq!(names, vec!["pct_big", "pct_small", "abs"]);
    }

    #[test]
    fn max_campaigns_caps_the_plan() {
        let cfg = Config { max_campaigns: 1, ..Config::default() };
        let all = vec![
            series("a", &[2.0, 2.0, 1.0, 1.0]),
            series("b", &[2.0, 2.0, 1.5, 1.5]),
        ];
        let plan = Planner::new(&cfg).plan("task", &all);
        assert_eq!(plan.selected.len(), 1);
        assert_eq!(plan.selected[0].campaign, "a");
        assert_eq!(plan.skipped[0].reason, SkipReason::Capped);
    }
}
