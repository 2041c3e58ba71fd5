use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::{
    Effect, FilterFields, JobResult, JobStatus, Patch, RequestId, ResultRow, RowKey,
};

/// Result buffer of the last synchronous query.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct QueryBuffer {
    pub rows: Vec<ResultRow>,
    pub loading: bool,
    pub error: Option<String>,
}

/// Bookkeeping for the job attached to this context.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct JobRecord {
    pub request_id: Option<RequestId>,
    pub status: Option<JobStatus>,
    pub progress: f64,
    pub message: String,
    pub result: Option<JobResult>,
    pub loading: bool,
    pub error: Option<String>,
}

impl JobRecord {
    pub fn is_running(&self) -> bool {
        self.request_id.is_some() && self.status == Some(JobStatus::Running)
    }
}

/// The full snapshot renderers read.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SessionState {
    pub filters: FilterFields,
    pub query: QueryBuffer,
    pub job: JobRecord,
    pub selection: Option<RowKey>,
}

macro_rules! merge_fields {
    ($target:expr, $patch:expr; $($from:ident => $to:ident),* $(,)?) => {
        $(
            if let Some(value) = &$patch.$from {
                $target.$to = value.clone();
            }
        )*
    };
}

impl SessionState {
    /// Shallow last-write-wins merge: every field present in `patch` replaces
    /// the current value, everything else is left alone.
    pub fn apply(&mut self, patch: &Patch) {
        merge_fields!(self.filters, patch;
            from_date => from_date,
            to_date => to_date,
            tickers => tickers,
            min_price => min_price,
            max_price => max_price,
            min_volume => min_volume,
            metric => metric,
            run_mode => run_mode,
        );
        merge_fields!(self.query, patch;
            rows => rows,
            loading => loading,
            error => error,
        );
        merge_fields!(self.job, patch;
            request_id => request_id,
            job_status => status,
            progress => progress,
            message => message,
            job_result => result,
            job_loading => loading,
            job_error => error,
        );
        merge_fields!(self, patch; selection => selection);
    }
}

/// Owner of the single in-memory snapshot of a context.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StateStore {
    snapshot: SessionState,
}

impl StateStore {
    pub fn new(snapshot: SessionState) -> Self {
        Self { snapshot }
    }

    pub fn read(&self) -> &SessionState {
        &self.snapshot
    }

    pub fn apply(&mut self, patch: &Patch) -> &SessionState {
        self.snapshot.apply(patch);
        &self.snapshot
    }
}

/// The subset of [`SessionState`] kept in the durable store.
///
/// Result buffers, loading flags and errors are never persisted.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistedRecord {
    pub filters: FilterFields,
    pub request_id: Option<RequestId>,
    pub job_status: Option<JobStatus>,
    pub progress: f64,
    pub message: String,
    pub selection: Option<RowKey>,
}

impl PersistedRecord {
    pub fn from_state(state: &SessionState) -> Self {
        Self {
            filters: state.filters.clone(),
            request_id: state.job.request_id.clone(),
            job_status: state.job.status,
            progress: state.job.progress,
            message: state.job.message.clone(),
            selection: state.selection.clone(),
        }
    }

    /// Merges the persisted fields of `patch` into the record; the rest of
    /// the patch is ignored.
    pub fn apply(&mut self, patch: &Patch) {
        merge_fields!(self.filters, patch;
            from_date => from_date,
            to_date => to_date,
            tickers => tickers,
            min_price => min_price,
            max_price => max_price,
            min_volume => min_volume,
            metric => metric,
            run_mode => run_mode,
        );
        merge_fields!(self, patch;
            request_id => request_id,
            job_status => job_status,
            progress => progress,
            message => message,
            selection => selection,
        );
    }

    /// Patch holding only the persisted fields that differ from `previous`.
    pub fn changes_since(&self, previous: &PersistedRecord) -> Patch {
        let current = self.to_patch();
        let previous = previous.to_patch();
        macro_rules! changed {
            ($($field:ident),* $(,)?) => {
                Patch {
                    $(
                        $field: if current.$field != previous.$field {
                            current.$field.clone()
                        } else {
                            None
                        },
                    )*
                    ..Patch::default()
                }
            };
        }
        changed!(
            from_date, to_date, tickers, min_price, max_price, min_volume, metric, run_mode,
            request_id, job_status, progress, message, selection,
        )
    }

    /// Patch that restores every persisted field.
    pub fn to_patch(&self) -> Patch {
        Patch {
            from_date: Some(self.filters.from_date.clone()),
            to_date: Some(self.filters.to_date.clone()),
            tickers: Some(self.filters.tickers.clone()),
            min_price: Some(self.filters.min_price),
            max_price: Some(self.filters.max_price),
            min_volume: Some(self.filters.min_volume),
            metric: Some(self.filters.metric.clone()),
            run_mode: Some(self.filters.run_mode),
            request_id: Some(self.request_id.clone()),
            job_status: Some(self.job_status),
            progress: Some(self.progress),
            message: Some(self.message.clone()),
            selection: Some(self.selection.clone()),
            ..Patch::default()
        }
    }
}

/// Why the poller left the polling state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    Done,
    Error,
    Cancelled,
    /// The status request itself failed; the remote job state is unknown.
    TransportError,
    /// Another context replaced or finished the job.
    Released,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum PollPhase {
    #[default]
    Idle,
    /// Restored job another context may already be polling. Ticks only
    /// count quiet intervals until this context takes over.
    Standby {
        request_id: RequestId,
        quiet_ticks: u32,
    },
    /// Timer armed, next tick will request status.
    Waiting { request_id: RequestId },
    /// Status request outstanding, no timer armed.
    InFlight { request_id: RequestId },
    Finished {
        request_id: RequestId,
        outcome: PollOutcome,
    },
}

impl PollPhase {
    /// Whether a timer is armed or a status request is outstanding.
    pub fn is_polling(&self) -> bool {
        matches!(
            self,
            PollPhase::Standby { .. } | PollPhase::Waiting { .. } | PollPhase::InFlight { .. }
        )
    }

    pub fn polled_request(&self) -> Option<&RequestId> {
        match self {
            PollPhase::Standby { request_id, .. }
            | PollPhase::Waiting { request_id }
            | PollPhase::InFlight { request_id } => Some(request_id),
            _ => None,
        }
    }
}

/// Context-local state: the shared snapshot plus bookkeeping that never
/// leaves the context.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SifterState {
    store: StateStore,
    pub(crate) poll: PollPhase,
    pub(crate) poll_generation: u64,
    pub(crate) query_generation: u64,
    pub(crate) job_generation: u64,
    pub(crate) results_requested: BTreeSet<RequestId>,
    /// Result fetch outstanding for this request.
    pub(crate) fetch_pending: Option<RequestId>,
    /// Requests this context has seen reach a terminal status.
    pub(crate) terminal_requests: BTreeSet<RequestId>,
    /// A sibling reported on the standby job since the last tick.
    pub(crate) sibling_active: bool,
    dirty: bool,
}

impl SifterState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> &SessionState {
        self.store.read()
    }

    pub fn poll_phase(&self) -> &PollPhase {
        &self.poll
    }

    pub fn persisted(&self) -> PersistedRecord {
        PersistedRecord::from_state(self.store.read())
    }

    /// Returns whether the snapshot changed since the last call.
    pub fn consume_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }

    /// Applies a local mutation and schedules its propagation.
    pub(crate) fn commit(&mut self, patch: Patch, effects: &mut Vec<Effect>) {
        if patch.is_empty() {
            return;
        }
        self.store.apply(&patch);
        self.dirty = true;
        self.note_terminal();
        effects.push(Effect::Propagate(patch));
    }

    /// Applies a patch without propagating it (restores and received patches).
    pub(crate) fn absorb(&mut self, patch: &Patch) {
        if patch.is_empty() {
            return;
        }
        self.store.apply(patch);
        self.dirty = true;
        self.note_terminal();
    }

    fn note_terminal(&mut self) {
        let job = &self.store.read().job;
        if let (Some(request_id), Some(status)) = (&job.request_id, job.status) {
            if status.is_terminal() && !self.terminal_requests.contains(request_id) {
                self.terminal_requests.insert(request_id.clone());
            }
        }
    }
}
