use crate::{JobSpec, Patch, QueryRequest, RequestId};

/// Side effects requested by [`crate::update`], executed by the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Persist (read-merge-write) and broadcast a locally applied patch.
    Propagate(Patch),
    RunQuery {
        generation: u64,
        request: QueryRequest,
    },
    /// Create a job. When `supersedes` is set, its cancellation must be
    /// requested (and settle) before the create call is made.
    CreateJob {
        generation: u64,
        spec: JobSpec,
        supersedes: Option<RequestId>,
    },
    /// Best-effort backend cancellation; failures are not reported back.
    CancelJob { request_id: RequestId },
    PollStatus {
        request_id: RequestId,
        generation: u64,
    },
    FetchResult { request_id: RequestId },
    /// Arm the poll timer, replacing any timer already armed.
    ArmPollTimer,
    StopPollTimer,
}
