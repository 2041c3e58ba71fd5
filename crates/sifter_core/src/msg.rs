use crate::{
    CreatedJob, FilterField, JobResult, Patch, PersistedRecord, RequestId, ResultRow, RowKey,
    StatusReply,
};

#[derive(Debug, Clone, PartialEq)]
pub enum Msg {
    /// User edited a filter field.
    SetField(FilterField),
    /// User ran the synchronous screen.
    RunQuery,
    /// User started a backend job with the current filters.
    StartJob,
    /// User cancelled the current job.
    CancelJob,
    /// User focused a result row.
    Select(RowKey),
    /// Context load: rebuild state from the durable record.
    Restore(PersistedRecord),
    /// Patch written by another context (bus or durable store change).
    RemotePatch(Patch),
    /// The poll timer fired.
    PollTick,
    QueryCompleted {
        generation: u64,
        result: Result<Vec<ResultRow>, String>,
    },
    JobCreated {
        generation: u64,
        result: Result<CreatedJob, String>,
    },
    StatusReceived {
        request_id: RequestId,
        generation: u64,
        result: Result<StatusReply, String>,
    },
    ResultFetched {
        request_id: RequestId,
        result: Result<JobResult, String>,
    },
}
