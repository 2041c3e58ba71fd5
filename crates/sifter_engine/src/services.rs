use std::fmt;

use sifter_core::{CreatedJob, JobResult, JobSpec, QueryRequest, ResultRow, StatusReply};

/// Failure talking to a backend service, before any domain answer was produced.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct ServiceError {
    pub kind: ServiceErrorKind,
    pub message: String,
}

impl ServiceError {
    pub fn new(kind: ServiceErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceErrorKind {
    InvalidUrl,
    HttpStatus(u16),
    Network,
    Decode,
}

impl fmt::Display for ServiceErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceErrorKind::InvalidUrl => write!(f, "invalid url"),
            ServiceErrorKind::HttpStatus(code) => write!(f, "http status {code}"),
            ServiceErrorKind::Network => write!(f, "network error"),
            ServiceErrorKind::Decode => write!(f, "malformed response"),
        }
    }
}

/// Single-shot synchronous screening.
#[async_trait::async_trait]
pub trait QueryService: Send + Sync {
    async fn run_query(&self, request: &QueryRequest) -> Result<Vec<ResultRow>, ServiceError>;
}

/// Long-running backend jobs.
#[async_trait::async_trait]
pub trait JobService: Send + Sync {
    async fn create_job(&self, spec: &JobSpec) -> Result<CreatedJob, ServiceError>;

    async fn get_status(&self, request_id: &str) -> Result<StatusReply, ServiceError>;

    /// Only meaningful once the job reported `Done`.
    async fn get_result(&self, request_id: &str) -> Result<JobResult, ServiceError>;

    async fn cancel(&self, request_id: &str) -> Result<(), ServiceError>;
}
