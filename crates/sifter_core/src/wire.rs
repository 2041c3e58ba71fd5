//! Request and response shapes exchanged with the query and job services.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{FilterFields, JobStatus};

pub type RequestId = String;

/// Composite identity of a result row: ticker plus trading date.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RowKey {
    pub ticker: String,
    pub date: String,
}

impl RowKey {
    pub fn new(ticker: impl Into<String>, date: impl Into<String>) -> Self {
        Self {
            ticker: ticker.into(),
            date: date.into(),
        }
    }
}

impl fmt::Display for RowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.ticker, self.date)
    }
}

/// One screening result. Columns beyond the key are passed through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRow {
    pub ticker: String,
    pub date: String,
    #[serde(flatten)]
    pub values: BTreeMap<String, Value>,
}

impl ResultRow {
    pub fn key(&self) -> RowKey {
        RowKey::new(self.ticker.clone(), self.date.clone())
    }
}

/// Payload fetched once a job reports `Done`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct JobResult {
    #[serde(default)]
    pub rows: Vec<ResultRow>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResponse {
    #[serde(default)]
    pub rows: Vec<ResultRow>,
}

/// Nested filter clause of a job request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterClause {
    pub metric: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_price: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_price: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_volume: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSpec {
    pub from_date: String,
    pub to_date: String,
    pub tickers: Vec<String>,
    pub filter: FilterClause,
}

impl From<&FilterFields> for JobSpec {
    fn from(filters: &FilterFields) -> Self {
        Self {
            from_date: filters.from_date.clone(),
            to_date: filters.to_date.clone(),
            tickers: filters.ticker_list(),
            filter: FilterClause {
                metric: filters.metric.clone(),
                min_price: filters.min_price,
                max_price: filters.max_price,
                min_volume: filters.min_volume,
            },
        }
    }
}

/// Body of a synchronous query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryRequest {
    pub from_date: String,
    pub to_date: String,
    pub tickers: Vec<String>,
    pub metric: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_price: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_price: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_volume: Option<f64>,
}

impl From<&FilterFields> for QueryRequest {
    fn from(filters: &FilterFields) -> Self {
        Self {
            from_date: filters.from_date.clone(),
            to_date: filters.to_date.clone(),
            tickers: filters.ticker_list(),
            metric: filters.metric.clone(),
            min_price: filters.min_price,
            max_price: filters.max_price,
            min_volume: filters.min_volume,
        }
    }
}

/// Acknowledgment of a created job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedJob {
    pub request_id: RequestId,
    pub status: i64,
}

/// One status poll. `status` stays a raw integer so unknown codes survive decoding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusReply {
    pub status: i64,
    #[serde(default)]
    pub progress: Option<f64>,
    #[serde(default)]
    pub message: Option<String>,
}

impl StatusReply {
    pub fn new(status: JobStatus, progress: Option<f64>, message: Option<&str>) -> Self {
        Self {
            status: status.code(),
            progress,
            message: message.map(ToOwned::to_owned),
        }
    }
}
