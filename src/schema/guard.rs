use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::Serialize;
use tracing::{info, warn};

use crate::config::{CleaningPolicy, NUMERIC_COLUMNS, REQUIRED_COLUMNS, ZERO_FLAGGED_COLUMNS};
use crate::error::{AppError, Result, SchemaViolation};
use crate::loader::RawTable;
use crate::types::Record;

/// Outcome of cleaning one table. Written to the schema stage log.
#[derive(Debug, Default, Clone, Serialize)]
pub struct SchemaReport {
    pub policy: String,
    pub rows_in: usize,
    pub rows_kept: usize,
    pub rows_dropped: usize,
    pub unexpected_columns: Vec<String>,
    /// Non-coercible, empty, NaN or infinite cells per column.
    pub invalid_cells: BTreeMap<String, usize>,
    /// Negative cells per column.
    pub negative_cells: BTreeMap<String, usize>,
    /// Rows with at least one invalid or negative numeric cell.
    pub rows_affected: usize,
    /// Zero values in spend / impressions / revenue. Kept, only flagged.
    pub zero_flags: BTreeMap<String, usize>,
    pub unparseable_dates: usize,
    pub blank_campaigns: usize,
}

impl SchemaReport {
    pub fn has_warnings(&self) -> bool {
        !self.unexpected_columns.is_empty()
            || self.rows_affected > 0
            || self.rows_dropped > 0
            || self.zero_flags.values().any(|n| *n > 0)
    }
}

enum Cell {
    Valid(f64),
    Invalid,
    Negative,
}

fn coerce_numeric(raw: &str) -> Cell {
    let trimmed = raw.trim();
    let trimmed = trimmed.strip_prefix('$').unwrap_or(trimmed).trim();
    match trimmed.parse::<f64>() {
        Ok(v) if !v.is_finite() => Cell::Invalid,
        Ok(v) if v < 0.0 => Cell::Negative,
        // -0.0 parses as non-negative; normalize it.
        Ok(v) => Cell::Valid(v + 0.0),
        Err(_) => Cell::Invalid,
    }
}

/// Accepts `YYYY-MM-DD`, `YYYY/MM/DD`, `MM/DD/YYYY` and timestamps with a date prefix.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let s = raw.trim();
    for fmt in ["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y"] {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return Some(d);
        }
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.date_naive());
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt.date());
        }
    }
    None
}

/// Validates the column set and cleans every row into a [`Record`].
pub struct SchemaGuard {
    required: Vec<String>,
    policy: CleaningPolicy,
}

impl SchemaGuard {
    pub fn new(policy: CleaningPolicy) -> Self {
        Self {
            required: REQUIRED_COLUMNS.iter().map(|c| c.to_string()).collect(),
            policy,
        }
    }

    /// Missing required columns are fatal; everything row-level is cleaned and counted.
    pub fn validate(&self, table: &RawTable) -> Result<(Vec<Record>, SchemaReport)> {
        let missing: Vec<String> = self
            .required
            .iter()
            .filter(|c| table.column_index(c).is_none())
            .cloned()
            .collect();
        if !missing.is_empty() {
            return Err(AppError::Schema(SchemaViolation {
                missing,
                found: table.headers.clone(),
                required: self.required.clone(),
            }));
        }

        let mut report = SchemaReport {
            policy: self.policy.to_string(),
            rows_in: table.rows.len(),
            ..SchemaReport::default()
        };
        report.unexpected_columns = table
            .headers
            .iter()
            .filter(|h| !self.required.contains(h))
            .cloned()
            .collect();
        if !report.unexpected_columns.is_empty() {
            warn!(
                columns = ?report.unexpected_columns,
                "[SCHEMA] ignoring {} unexpected column(s)",
                report.unexpected_columns.len(),
            );
        }

        // Every required column was found above.
        let idx: BTreeMap<&str, usize> = REQUIRED_COLUMNS
            .iter()
            .filter_map(|c| table.column_index(c).map(|i| (*c, i)))
            .collect();
        let cell = |row: &[String], col: &str| -> String {
            idx.get(col)
                .and_then(|i| row.get(*i))
                .cloned()
                .unwrap_or_default()
        };

        let mut records = Vec::with_capacity(table.rows.len());
        for row in &table.rows {
            let campaign_name = cell(row, "campaign_name").trim().to_string();
            if campaign_name.is_empty() {
                report.blank_campaigns += 1;
                continue;
            }
            let Some(date) = parse_date(&cell(row, "date")) else {
                report.unparseable_dates += 1;
                continue;
            };

            let mut values: BTreeMap<&str, f64> = BTreeMap::new();
            let mut affected = false;
            for &col in NUMERIC_COLUMNS {
                let value = match coerce_numeric(&cell(row, col)) {
                    Cell::Valid(v) => v,
                    Cell::Invalid => {
                        *report.invalid_cells.entry(col.to_string()).or_default() += 1;
                        affected = true;
                        0.0
                    }
                    Cell::Negative => {
                        *report.negative_cells.entry(col.to_string()).or_default() += 1;
                        affected = true;
                        0.0
                    }
                };
                values.insert(col, value);
            }
            if affected {
                report.rows_affected += 1;
                if self.policy == CleaningPolicy::DropRow {
                    continue;
                }
            }
            for &col in ZERO_FLAGGED_COLUMNS {
                if values.get(col).copied().unwrap_or(0.0) == 0.0 {
                    *report.zero_flags.entry(col.to_string()).or_default() += 1;
                }
            }

            let num = |col: &str| values.get(col).copied().unwrap_or(0.0);
            records.push(Record {
                campaign_name,
                adset_name: cell(row, "adset_name").trim().to_string(),
                date,
                spend: num("spend"),
                impressions: num("impressions"),
                clicks: num("clicks"),
                ctr: num("ctr"),
                purchases: num("purchases"),
                revenue: num("revenue"),
                roas: num("roas"),
                creative_type: cell(row, "creative_type").trim().to_string(),
                creative_message: cell(row, "creative_message").trim().to_string(),
                audience_type: cell(row, "audience_type").trim().to_string(),
            });
        }

        report.rows_kept = records.len();
        report.rows_dropped = report.rows_in - report.rows_kept;

        if report.rows_affected > 0 {
            warn!(
                policy = %self.policy,
                rows_affected = report.rows_affected,
                invalid = ?report.invalid_cells,
                negative = ?report.negative_cells,
                "[SCHEMA] cleaned {} row(s) with invalid numeric values (policy: {})",
                report.rows_affected,
                self.policy,
            );
        }
        if report.unparseable_dates > 0 || report.blank_campaigns > 0 {
            warn!(
                unparseable_dates = report.unparseable_dates,
                blank_campaigns = report.blank_campaigns,
                "[SCHEMA] dropped rows without a usable date or campaign",
            );
        }
        if report.zero_flags.values().any(|n| *n > 0) {
            warn!(zero_flags = ?report.zero_flags, "[SCHEMA] zero-valued anomalies kept");
        }
        info!(
            rows_in = report.rows_in,
            rows_kept = report.rows_kept,
            rows_dropped = report.rows_dropped,
            "[SCHEMA] {} of {} rows kept",
            report.rows_kept,
            report.rows_in,
        );

        Ok((records, report))
    }
}
