//! Sifter core: pure session state, patch merging and the job lifecycle
//! state machine. All IO lives in `sifter_engine`.
mod effect;
mod fields;
mod msg;
mod patch;
mod poll;
mod state;
mod status;
mod update;
mod wire;

pub use effect::Effect;
pub use fields::{FieldError, FilterField, FilterFields, RunMode};
pub use msg::Msg;
pub use patch::Patch;
pub use poll::STANDBY_QUIET_TICKS;
pub use state::{
    JobRecord, PersistedRecord, PollOutcome, PollPhase, QueryBuffer, SessionState, SifterState,
    StateStore,
};
pub use status::{JobStatus, UnknownStatus, WireStatus};
pub use update::update;
pub use wire::{
    CreatedJob, FilterClause, JobResult, JobSpec, QueryRequest, QueryResponse, RequestId,
    ResultRow, RowKey, StatusReply,
};
