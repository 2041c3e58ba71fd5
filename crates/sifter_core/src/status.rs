use std::fmt;

use serde::{Deserialize, Serialize};

/// Job status as reported by the job service. Serialized as its wire integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum JobStatus {
    Running,
    Done,
    Error,
    Cancelled,
}

impl JobStatus {
    pub const fn code(self) -> i64 {
        match self {
            JobStatus::Running => 2,
            JobStatus::Done => 3,
            JobStatus::Error => 4,
            JobStatus::Cancelled => 5,
        }
    }

    pub const fn is_terminal(self) -> bool {
        !matches!(self, JobStatus::Running)
    }

    /// Message shown when the backend did not supply one.
    pub fn default_message(self) -> &'static str {
        match self {
            JobStatus::Running => "Job running",
            JobStatus::Done => "Job completed",
            JobStatus::Error => "Job failed",
            JobStatus::Cancelled => "Job cancelled",
        }
    }
}

impl From<JobStatus> for i64 {
    fn from(status: JobStatus) -> Self {
        status.code()
    }
}

impl TryFrom<i64> for JobStatus {
    type Error = UnknownStatus;

    fn try_from(code: i64) -> Result<Self, UnknownStatus> {
        match WireStatus::from_code(code) {
            WireStatus::Known(status) => Ok(status),
            WireStatus::Unknown(code) => Err(UnknownStatus(code)),
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JobStatus::Running => "running",
            JobStatus::Done => "done",
            JobStatus::Error => "error",
            JobStatus::Cancelled => "cancelled",
        };
        write!(f, "{name}({})", self.code())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("unknown job status code {0}")]
pub struct UnknownStatus(pub i64);

/// A status integer as it arrives from the wire.
///
/// Codes outside the known set (including the backend's `1 = Queued`) are kept
/// as `Unknown` and treated as not terminal by the poller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireStatus {
    Known(JobStatus),
    Unknown(i64),
}

impl WireStatus {
    pub fn from_code(code: i64) -> Self {
        match code {
            2 => WireStatus::Known(JobStatus::Running),
            3 => WireStatus::Known(JobStatus::Done),
            4 => WireStatus::Known(JobStatus::Error),
            5 => WireStatus::Known(JobStatus::Cancelled),
            other => WireStatus::Unknown(other),
        }
    }
}
