use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::Patch;

/// How the screen is executed: a single synchronous query or a backend job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    #[default]
    Quick,
    Job,
}

impl FromStr for RunMode {
    type Err = FieldError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "quick" => Ok(RunMode::Quick),
            "job" => Ok(RunMode::Job),
            other => Err(FieldError::InvalidValue {
                key: "run_mode".to_string(),
                value: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunMode::Quick => write!(f, "quick"),
            RunMode::Job => write!(f, "job"),
        }
    }
}

/// The user-editable screening inputs. The engine stores and propagates these
/// without interpreting them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterFields {
    pub from_date: String,
    pub to_date: String,
    pub tickers: String,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub min_volume: Option<f64>,
    pub metric: String,
    pub run_mode: RunMode,
}

impl Default for FilterFields {
    fn default() -> Self {
        Self {
            from_date: String::new(),
            to_date: String::new(),
            tickers: String::new(),
            min_price: None,
            max_price: None,
            min_volume: None,
            metric: "change_pct".to_string(),
            run_mode: RunMode::Quick,
        }
    }
}

impl FilterFields {
    /// Tickers split on commas and whitespace, upper-cased, empties dropped.
    pub fn ticker_list(&self) -> Vec<String> {
        self.tickers
            .split(|c: char| c == ',' || c.is_whitespace())
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_ascii_uppercase)
            .collect()
    }
}

/// A single filter field assignment, as passed to `setField`.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterField {
    FromDate(String),
    ToDate(String),
    Tickers(String),
    MinPrice(Option<f64>),
    MaxPrice(Option<f64>),
    MinVolume(Option<f64>),
    Metric(String),
    RunMode(RunMode),
}

impl FilterField {
    pub const KEYS: [&'static str; 8] = [
        "from_date",
        "to_date",
        "tickers",
        "min_price",
        "max_price",
        "min_volume",
        "metric",
        "run_mode",
    ];

    /// Parses a `key`/`value` pair as typed on a command line.
    ///
    /// Empty text clears the optional thresholds.
    pub fn parse(key: &str, value: &str) -> Result<Self, FieldError> {
        let value = value.trim();
        match key {
            "from_date" => Ok(FilterField::FromDate(value.to_string())),
            "to_date" => Ok(FilterField::ToDate(value.to_string())),
            "tickers" => Ok(FilterField::Tickers(value.to_string())),
            "min_price" => parse_threshold(key, value).map(FilterField::MinPrice),
            "max_price" => parse_threshold(key, value).map(FilterField::MaxPrice),
            "min_volume" => parse_threshold(key, value).map(FilterField::MinVolume),
            "metric" => Ok(FilterField::Metric(value.to_string())),
            "run_mode" => value.parse().map(FilterField::RunMode),
            other => Err(FieldError::UnknownKey(other.to_string())),
        }
    }

    pub fn key(&self) -> &'static str {
        match self {
            FilterField::FromDate(_) => "from_date",
            FilterField::ToDate(_) => "to_date",
            FilterField::Tickers(_) => "tickers",
            FilterField::MinPrice(_) => "min_price",
            FilterField::MaxPrice(_) => "max_price",
            FilterField::MinVolume(_) => "min_volume",
            FilterField::Metric(_) => "metric",
            FilterField::RunMode(_) => "run_mode",
        }
    }

    pub fn into_patch(self) -> Patch {
        let mut patch = Patch::default();
        match self {
            FilterField::FromDate(v) => patch.from_date = Some(v),
            FilterField::ToDate(v) => patch.to_date = Some(v),
            FilterField::Tickers(v) => patch.tickers = Some(v),
            FilterField::MinPrice(v) => patch.min_price = Some(v),
            FilterField::MaxPrice(v) => patch.max_price = Some(v),
            FilterField::MinVolume(v) => patch.min_volume = Some(v),
            FilterField::Metric(v) => patch.metric = Some(v),
            FilterField::RunMode(v) => patch.run_mode = Some(v),
        }
        patch
    }
}

fn parse_threshold(key: &str, value: &str) -> Result<Option<f64>, FieldError> {
    if value.is_empty() {
        return Ok(None);
    }
    match value.parse::<f64>() {
        Ok(number) if number.is_finite() => Ok(Some(number)),
        _ => Err(FieldError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        }),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FieldError {
    #[error("unknown field {0:?}")]
    UnknownKey(String),
    #[error("invalid value {value:?} for field {key}")]
    InvalidValue { key: String, value: String },
}
