use std::path::PathBuf;

use serde::Serialize;

use crate::error::{AppError, Result};

pub const INPUT_PATH: &str = "data/sample.csv";
pub const OUT_DIR: &str = "reports";
pub const LOG_DIR: &str = "logs";
pub const TASK_TEXT: &str = "Analyze ROAS drop";

/// Columns every input file must carry. Order is the order reported in schema errors.
pub const REQUIRED_COLUMNS: &[&str] = &[
    "campaign_name",
    "adset_name",
    "date",
    "spend",
    "impressions",
    "clicks",
    "ctr",
    "purchases",
    "revenue",
    "roas",
    "creative_type",
    "creative_message",
    "audience_type",
];

/// Numeric columns coerced by the schema guard.
pub const NUMERIC_COLUMNS: &[&str] = &[
    "spend",
    "impressions",
    "clicks",
    "ctr",
    "purchases",
    "revenue",
    "roas",
];

/// Columns where a zero value is flagged as an anomaly but kept.
pub const ZERO_FLAGGED_COLUMNS: &[&str] = &["spend", "impressions", "revenue"];

/// Backoff between load attempts, in milliseconds. The last value repeats.
pub const RETRY_BACKOFF_MS: &[u64] = &[100, 200, 400, 800];

/// Series length at which the sample-size part of confidence saturates.
pub const FULL_CONFIDENCE_SAMPLES: usize = 14;

/// Creative messages kept per campaign for the synthesizer.
pub const CREATIVE_EXAMPLES_PER_CAMPAIGN: usize = 5;

/// What the schema guard does with a numeric cell it cannot use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CleaningPolicy {
    /// Replace the cell with 0.0 and keep the row.
    SubstituteZero,
    /// Drop the whole row.
    DropRow,
}

impl std::fmt::Display for CleaningPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CleaningPolicy::SubstituteZero => write!(f, "substitute_zero"),
            CleaningPolicy::DropRow => write!(f, "drop_row"),
        }
    }
}

impl std::str::FromStr for CleaningPolicy {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "substitute_zero" | "zero" => Ok(CleaningPolicy::SubstituteZero),
            "drop_row" | "drop" => Ok(CleaningPolicy::DropRow),
            other => Err(AppError::Config(format!(
                "CLEANING_POLICY must be substitute_zero or drop_row, got '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Config {
    pub input_path: PathBuf,
    pub out_dir: PathBuf,
    pub log_dir: PathBuf,
    pub log_level: String,
    pub task_text: String,
    /// Series shorter than this are never selected (MIN_SERIES_LEN)
    pub min_series_len: usize,
    /// ROAS drop in percent that selects a campaign (DECLINE_THRESHOLD_PCT)
    pub decline_threshold_pct: f64,
    /// Absolute ROAS drop used when a percentage cannot be computed (MIN_ABS_DROP)
    pub min_abs_drop: f64,
    /// Cap on selected campaigns, 0 = no cap (MAX_CAMPAIGNS)
    pub max_campaigns: usize,
    /// CTR drop in percent that raises a CTR / fatigue hypothesis (CTR_DROP_PCT)
    pub ctr_drop_pct: f64,
    /// Spend rise in percent that raises a spend-shift hypothesis (SPEND_RISE_PCT)
    pub spend_rise_pct: f64,
    /// Insights below this confidence are not surfaced (CONFIDENCE_THRESHOLD)
    pub confidence_threshold: f64,
    /// Attempts per retried call, first attempt included (RETRY_LIMIT)
    pub retry_limit: u32,
    /// |delta %| at which impact becomes medium (IMPACT_MEDIUM_PCT)
    pub impact_medium_pct: f64,
    /// |delta %| above which impact becomes high (IMPACT_HIGH_PCT)
    pub impact_high_pct: f64,
    pub cleaning_policy: CleaningPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            input_path: PathBuf::from(INPUT_PATH),
            out_dir: PathBuf::from(OUT_DIR),
            log_dir: PathBuf::from(LOG_DIR),
            log_level: "info".to_string(),
            task_text: TASK_TEXT.to_string(),
            min_series_len: 4,
            decline_threshold_pct: 10.0,
            min_abs_drop: 0.1,
            max_campaigns: 0,
            ctr_drop_pct: 15.0,
            spend_rise_pct: 5.0,
            confidence_threshold: 0.5,
            retry_limit: 3,
            impact_medium_pct: 10.0,
            impact_high_pct: 30.0,
            cleaning_policy: CleaningPolicy::SubstituteZero,
        }
    }
}

/// `LOG_DIR` if set, else the default. Also used when the rest of the config is invalid.
pub fn log_dir_from<F>(lookup: &F) -> PathBuf
where
    F: Fn(&str) -> Option<String>,
{
    lookup("LOG_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(LOG_DIR))
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from any key lookup. Unparsable numbers fall back to the default.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let d = Self::default();
        let cfg = Self {
            input_path: lookup("INPUT_PATH").map(PathBuf::from).unwrap_or(d.input_path),
            out_dir: lookup("OUT_DIR").map(PathBuf::from).unwrap_or(d.out_dir),
            log_dir: log_dir_from(&lookup),
            log_level: lookup("LOG_LEVEL").unwrap_or(d.log_level),
            task_text: lookup("TASK_TEXT").unwrap_or(d.task_text),
            min_series_len: parse_or(&lookup, "MIN_SERIES_LEN", d.min_series_len),
            decline_threshold_pct: parse_or(&lookup, "DECLINE_THRESHOLD_PCT", d.decline_threshold_pct),
            min_abs_drop: parse_or(&lookup, "MIN_ABS_DROP", d.min_abs_drop),
            max_campaigns: parse_or(&lookup, "MAX_CAMPAIGNS", d.max_campaigns),
            ctr_drop_pct: parse_or(&lookup, "CTR_DROP_PCT", d.ctr_drop_pct),
            spend_rise_pct: parse_or(&lookup, "SPEND_RISE_PCT", d.spend_rise_pct),
            confidence_threshold: parse_or(&lookup, "CONFIDENCE_THRESHOLD", d.confidence_threshold),
            retry_limit: parse_or(&lookup, "RETRY_LIMIT", d.retry_limit),
            impact_medium_pct: parse_or(&lookup, "IMPACT_MEDIUM_PCT", d.impact_medium_pct),
            impact_high_pct: parse_or(&lookup, "IMPACT_HIGH_PCT", d.impact_high_pct),
            cleaning_policy: match lookup("CLEANING_POLICY") {
                Some(raw) => raw.parse()?,
                None => d.cleaning_policy,
            },
        };
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.min_series_len < 2 {
            return Err(AppError::Config("MIN_SERIES_LEN must be at least 2".to_string()));
        }
        if self.retry_limit == 0 {
            return Err(AppError::Config("RETRY_LIMIT must be at least 1".to_string()));
        }
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(AppError::Config(
                "CONFIDENCE_THRESHOLD must be within [0, 1]".to_string(),
            ));
        }
        let pcts = [
            ("DECLINE_THRESHOLD_PCT", self.decline_threshold_pct),
            ("MIN_ABS_DROP", self.min_abs_drop),
            ("CTR_DROP_PCT", self.ctr_drop_pct),
            ("SPEND_RISE_PCT", self.spend_rise_pct),
            ("IMPACT_MEDIUM_PCT", self.impact_medium_pct),
            ("IMPACT_HIGH_PCT", self.impact_high_pct),
        ];
        for (name, value) in pcts {
            if !value.is_finite() || value < 0.0 {
                return Err(AppError::Config(format!("{name} must be a non-negative number")));
            }
        }
        if self.impact_medium_pct >= self.impact_high_pct {
            return Err(AppError::Config(
                "IMPACT_MEDIUM_PCT must be below IMPACT_HIGH_PCT".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    lookup(key)
        .and_then(|raw| raw.trim().parse::<T>().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_nothing_is_set() {
        let cfg = Config::from_lookup(|_| None).unwrap();
        assert_eq!(cfg.min_series_len, 4);
        assert_eq!(cfg.retry_limit, 3);
        assert_eq!(cfg.cleaning_policy, CleaningPolicy::SubstituteZero);
        assert_eq!(cfg.input_path, PathBuf::from(INPUT_PATH));
    }

    #[test]
    fn overrides_and_bad_numbers_fall_back() {
        let cfg = Config::from_lookup(lookup_from(&[
            ("DECLINE_THRESHOLD_PCT", "25"),
            ("RETRY_LIMIT", "not-a-number"),
            ("CLEANING_POLICY", "drop_row"),
        ]))
        .unwrap();
        assert_eq!(cfg.decline_threshold_pct, 25.0);
        assert_eq!(cfg.retry_limit, 3);
        assert_eq!(cfg.cleaning_policy, CleaningPolicy::DropRow);
    }

    #[test]
    fn rejects_inverted_impact_boundaries() {
        let err = Config::from_lookup(lookup_from(&[
            ("IMPACT_MEDIUM_PCT", "40"),
            ("IMPACT_HIGH_PCT", "30"),
        ]))
        .unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
    }

    #[test]
    fn log_dir_survives_an_invalid_config() {
        let env = lookup_from(&[("LOG_DIR", "/tmp/run-logs"), ("RETRY_LIMIT", "0")]);
        assert!(Config::from_lookup(&env).is_err());
        assert_eq!(log_dir_from(&env), PathBuf::from("/tmp/run-logs"));
        assert_eq!(log_dir_from(&|_: &str| None), PathBuf::from(LOG_DIR));
    }

    #[test]
    fn rejects_unknown_cleaning_policy() {
        let err = Config::from_lookup(lookup_from(&[("CLEANING_POLICY", "ignore")])).unwrap_err();
        assert!(err.to_string().contains("CLEANING_POLICY"));
    }

    #[test]
    fn rejects_confidence_outside_unit_interval() {
        assert!(Config::from_lookup(lookup_from(&[("CONFIDENCE_THRESHOLD", "1.5")])).is_err());
        assert!(Config::from_lookup(lookup_from(&[("MIN_SERIES_LEN", "1")])).is_err());
    }
}
