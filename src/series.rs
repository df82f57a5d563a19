//! Campaign series construction and the pre/post split shared by every stage.

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;

use crate::config::CREATIVE_EXAMPLES_PER_CAMPAIGN;
use crate::types::{CampaignSeries, DailyPoint, Record};

/// Split a chronological slice into (pre, post) at `len / 2`.
/// An odd element goes to post. Every stage splits through this function.
pub fn split_pre_post<T>(items: &[T]) -> (&[T], &[T]) {
    items.split_at(items.len() / 2)
}

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let m = values.iter().sum::<f64>() / values.len() as f64;
    m.is_finite().then_some(m)
}

/// Population variance; `None` for an empty slice.
pub fn variance(values: &[f64]) -> Option<f64> {
    let m = mean(values)?;
    Some(values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64)
}

/// Percent change from `pre` to `post`; `None` when `pre` is zero.
pub fn pct_change(pre: f64, post: f64) -> Option<f64> {
    if pre == 0.0 {
        return None;
    }
    Some((post - pre) / pre.abs() * 100.0)
}

/// `num / den`, or `fallback` when the denominator is not positive.
/// CTR and ROAS are always derived through this rule.
pub fn ratio_or(num: f64, den: f64, fallback: f64) -> f64 {
    if den > 0.0 {
        num / den
    } else {
        fallback
    }
}

/// Least-squares slope of `values` against their index. Zero for fewer than two points.
pub fn slope(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 2 {
        return 0.0;
    }
    let x_mean = (n - 1) as f64 / 2.0;
    let y_mean = values.iter().sum::<f64>() / n as f64;
    let mut num = 0.0;
    let mut den = 0.0;
    for (i, y) in values.iter().enumerate() {
        let dx = i as f64 - x_mean;
        num += dx * (y - y_mean);
        den += dx * dx;
    }
    if den == 0.0 {
        0.0
    } else {
        num / den
    }
}

#[derive(Default)]
struct DayAccumulator {
    spend: f64,
    impressions: f64,
    clicks: f64,
    purchases: f64,
    revenue: f64,
    reported_ctr: f64,
    reported_roas: f64,
    rows: usize,
}

impl DayAccumulator {
    fn add(&mut self, r: &Record) {
        self.spend += r.spend;
        self.impressions += r.impressions;
        self.clicks += r.clicks;
        self.purchases += r.purchases;
        self.revenue += r.revenue;
        self.reported_ctr += r.ctr;
        self.reported_roas += r.roas;
        self.rows += 1;
    }

    fn finish(self, date: NaiveDate) -> DailyPoint {
        let rows = self.rows.max(1) as f64;
        let ctr = ratio_or(self.clicks, self.impressions, self.reported_ctr / rows);
        let roas = ratio_or(self.revenue, self.spend, self.reported_roas / rows);
        DailyPoint {
            date,
            spend: self.spend,
            impressions: self.impressions,
            clicks: self.clicks,
            purchases: self.purchases,
            revenue: self.revenue,
            ctr,
            roas,
            rows: self.rows,
        }
    }
}

/// Group cleaned records by campaign, one daily point per date.
/// Output is ordered by campaign name; points by date ascending.
pub fn build_series(records: &[Record]) -> Vec<CampaignSeries> {
    let mut by_campaign: BTreeMap<&str, Vec<&Record>> = BTreeMap::new();
    for r in records {
        by_campaign.entry(r.campaign_name.as_str()).or_default().push(r);
    }

    by_campaign
        .into_iter()
        .map(|(campaign, mut rows)| {
            // Stable sort keeps file order within a day.
            rows.sort_by_key(|r| r.date);

            let mut days: BTreeMap<NaiveDate, DayAccumulator> = BTreeMap::new();
            let mut adsets = BTreeSet::new();
            let mut creative_examples: Vec<String> = Vec::new();
            for r in &rows {
                days.entry(r.date).or_default().add(r);
                if !r.adset_name.is_empty() {
                    adsets.insert(r.adset_name.clone());
                }
                if !r.creative_message.is_empty()
                    && creative_examples.len() < CREATIVE_EXAMPLES_PER_CAMPAIGN
                    && !creative_examples.contains(&r.creative_message)
                {
                    creative_examples.push(r.creative_message.clone());
                }
            }

            CampaignSeries {
                campaign: campaign.to_string(),
                points: days.into_iter().map(|(d, acc)| acc.finish(d)).collect(),
                adsets: adsets.into_iter().collect(),
                creative_examples,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn record(campaign: &str, day: u32, spend: f64, revenue: f64) -> Record {
        Record {
            campaign_name: campaign.to_string(),
            adset_name: format!("{campaign}-set"),
            date: NaiveDate::from_ymd_opt(2025, 1, day).unwrap(),
            spend,
            impressions: 1000.0,
            clicks: 20.0,
            ctr: 0.02,
            purchases: 1.0,
            revenue,
            roas: if spend > 0.0 { revenue / spend } else { 0.0 },
            creative_type: "image".to_string(),
            creative_message: format!("Message {day}"),
            audience_type: "broad".to_string(),
        }
    }

    #[test]
    fn odd_length_puts_extra_point_in_post() {
        let items = [1, 2, 3, 4, 5];
        let (pre, post) = split_pre_post(&items);
        assert_eq!(pre, &[1, 2]);
        assert_eq!(post, &[3, 4, 5]);
    }

    #[test]
    fn pct_change_is_undefined_for_zero_baseline() {
        assert_eq!(pct_change(0.0, 3.0), None);
        assert_eq!(pct_change(2.0, 1.0), Some(-50.0));
    }

    #[test]
    fn slope_of_linear_series() {
        assert!((slope(&[1.0, 2.0, 3.0, 4.0]) - 1.0).abs() < 1e-12);
        assert_eq!(slope(&[5.0]), 0.0);
        assert_eq!(slope(&[2.0, 2.0, 2.0]), 0.0);
    }

    #[test]
    fn groups_by_campaign_and_sums_days() {
        let records = vec![
            record("B", 2, 10.0, 30.0),
            record("A", 2, 10.0, 20.0),
            record("A", 1, 10.0, 10.0),
            record("A", 2, 30.0, 60.0),
        ];
        let series = build_series(&records);
        assert_eq!(series.len(), 2);
        assert_eq!(series[0].campaign, "A");
        assert_eq!(series[0].len(), 2);
        let day2 = &series[0].points[1];
        assert_eq!(day2.rows, 2);
        assert_eq!(day2.spend, 40.0);
        assert!((day2.roas - 2.0).abs() < 1e-12);
        assert_eq!(series[0].creative_examples, vec!["Message 1", "Message 2"]);
    }

    #[test]
    fn zero_spend_day_uses_reported_roas() {
        let mut r = record("A", 1, 0.0, 0.0);
        r.roas = 1.5;
        let series = build_series(&[r]);
        assert_eq!(series[0].points[0].roas, 1.5);
    }

    proptest! {
        #[test]
        fn split_partitions_exactly(items in proptest::collection::vec(any::<i32>(), 2..200)) {
            let (pre, post) = split_pre_post(&items);
            prop_assert_eq!(pre.len() + post.len(), items.len());
            prop_assert!(post.len() >= pre.len());
            prop_assert!(post.len() - pre.len() <= 1);
            let rejoined: Vec<i32> = pre.iter().chain(post.iter()).copied().collect();
            prop_assert_eq!(rejoined, items);
        }
    }
}
