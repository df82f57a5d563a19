use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::Serialize;

use crate::series::ratio_or;
use crate::types::Record;

/// Dataset-level figures shown at the top of the report.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DataSummary {
    pub rows: usize,
    /// First and last date present; `None` for an empty table.
    pub date_range: Option<(NaiveDate, NaiveDate)>,
    pub total_spend: f64,
    pub total_revenue: f64,
    /// Row mean of clicks / impressions.
    pub avg_ctr: f64,
    /// Row mean of revenue / spend.
    pub avg_roas: f64,
    pub campaigns_count: usize,
    /// Campaigns by mean row ROAS, best first; ties by name.
    pub top_by_roas: Vec<CampaignRoas>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CampaignRoas {
    pub campaign: String,
    pub mean_roas: f64,
}

impl DataSummary {
    pub fn from_records(records: &[Record]) -> Self {
        if records.is_empty() {
            return Self::default();
        }
        let n = records.len() as f64;

        // Reported cells only stand in where the ratio is undefined.
        let row_roas: Vec<f64> = records
            .iter()
            .map(|r| ratio_or(r.revenue, r.spend, r.roas))
            .collect();
        let row_ctr: Vec<f64> = records
            .iter()
            .map(|r| ratio_or(r.clicks, r.impressions, r.ctr))
            .collect();

        let mut by_campaign: BTreeMap<&str, (f64, usize)> = BTreeMap::new();
        for (r, roas) in records.iter().zip(&row_roas) {
            let entry = by_campaign.entry(r.campaign_name.as_str()).or_default();
            entry.0 += roas;
            entry.1 += 1;
        }
        let mut top_by_roas: Vec<CampaignRoas> = by_campaign
            .iter()
            .map(|(campaign, (sum, count))| CampaignRoas {
                campaign: campaign.to_string(),
                mean_roas: sum / *count as f64,
            })
            .collect();
        top_by_roas.sort_by(|a, b| {
            b.mean_roas
                .total_cmp(&a.mean_roas)
                .then_with(|| a.campaign.cmp(&b.campaign))
        });

        let first = records.iter().map(|r| r.date).min();
        let last = records.iter().map(|r| r.date).max();

        Self {
            rows: records.len(),
            date_range: first.zip(last),
            total_spend: records.iter().map(|r| r.spend).sum(),
            total_revenue: records.iter().map(|r| r.revenue).sum(),
            avg_ctr: row_ctr.iter().sum::<f64>() / n,
            avg_roas: row_roas.iter().sum::<f64>() / n,
            campaigns_count: by_campaign.len(),
            top_by_roas,
        }
    }
}
