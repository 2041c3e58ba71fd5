#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

use sifter_core::{
    CreatedJob, JobResult, JobSpec, JobStatus, QueryRequest, ResultRow, SessionState, StatusReply,
};
use sifter_engine::{
    ContextHandle, JobService, Origin, QueryService, ServiceError, ServiceErrorKind, Services,
    SifterSettings,
};

pub fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(engine_logging::initialize_for_tests);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Query,
    Create,
    Status(String),
    Result(String),
    Cancel(String),
}

#[derive(Default)]
struct Script {
    calls: Vec<Call>,
    job_ids: VecDeque<String>,
    statuses: HashMap<String, VecDeque<StatusReply>>,
    rows: Vec<ResultRow>,
    fail_query: bool,
    fail_cancel: bool,
    fail_result: bool,
    status_delay: Duration,
    query_delay: Duration,
}

/// Scripted query and job services that record every call.
#[derive(Default)]
pub struct FakeBackend {
    script: Mutex<Script>,
    status_in_flight: AtomicUsize,
    max_status_in_flight: AtomicUsize,
}

impl FakeBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_job_ids(self: &Arc<Self>, ids: &[&str]) -> Arc<Self> {
        self.script.lock().unwrap().job_ids = ids.iter().map(|id| id.to_string()).collect();
        self.clone()
    }

    /// Replies served in order; once exhausted the job reports `Running`.
    pub fn script_status(self: &Arc<Self>, request_id: &str, replies: Vec<StatusReply>) -> Arc<Self> {
        self.script
            .lock()
            .unwrap()
            .statuses
            .insert(request_id.to_string(), replies.into());
        self.clone()
    }

    pub fn with_rows(self: &Arc<Self>, rows: Vec<ResultRow>) -> Arc<Self> {
        self.script.lock().unwrap().rows = rows;
        self.clone()
    }

    pub fn failing_query(self: &Arc<Self>) -> Arc<Self> {
        self.script.lock().unwrap().fail_query = true;
        self.clone()
    }

    pub fn failing_cancel(self: &Arc<Self>) -> Arc<Self> {
        self.script.lock().unwrap().fail_cancel = true;
        self.clone()
    }

    pub fn failing_result(self: &Arc<Self>) -> Arc<Self> {
        self.script.lock().unwrap().fail_result = true;
        self.clone()
    }

    pub fn with_status_delay(self: &Arc<Self>, delay: Duration) -> Arc<Self> {
        self.script.lock().unwrap().status_delay = delay;
        self.clone()
    }

    pub fn with_query_delay(self: &Arc<Self>, delay: Duration) -> Arc<Self> {
        self.script.lock().unwrap().query_delay = delay;
        self.clone()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.script.lock().unwrap().calls.clone()
    }

    pub fn count(&self, call: &Call) -> usize {
        self.calls().iter().filter(|c| *c == call).count()
    }

    pub fn max_status_in_flight(&self) -> usize {
        self.max_status_in_flight.load(Ordering::SeqCst)
    }

    fn record(&self, call: Call) {
        self.script.lock().unwrap().calls.push(call);
    }
}

fn transport_error() -> ServiceError {
    ServiceError::new(ServiceErrorKind::Network, "connection refused")
}

#[async_trait::async_trait]
impl QueryService for FakeBackend {
    async fn run_query(&self, _request: &QueryRequest) -> Result<Vec<ResultRow>, ServiceError> {
        self.record(Call::Query);
        let delay = self.script.lock().unwrap().query_delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let script = self.script.lock().unwrap();
        if script.fail_query {
            return Err(transport_error());
        }
        Ok(script.rows.clone())
    }
}

#[async_trait::async_trait]
impl JobService for FakeBackend {
    async fn create_job(&self, _spec: &JobSpec) -> Result<CreatedJob, ServiceError> {
        self.record(Call::Create);
        let request_id = self
            .script
            .lock()
            .unwrap()
            .job_ids
            .pop_front()
            .ok_or_else(|| ServiceError::new(ServiceErrorKind::HttpStatus(503), "no capacity"))?;
        Ok(CreatedJob {
            request_id,
            status: JobStatus::Running.code(),
        })
    }

    async fn get_status(&self, request_id: &str) -> Result<StatusReply, ServiceError> {
        self.record(Call::Status(request_id.to_string()));
        let now = self.status_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_status_in_flight.fetch_max(now, Ordering::SeqCst);

        let delay = self.script.lock().unwrap().status_delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let reply = self
            .script
            .lock()
            .unwrap()
            .statuses
            .get_mut(request_id)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| StatusReply::new(JobStatus::Running, None, None));

        self.status_in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(reply)
    }

    async fn get_result(&self, request_id: &str) -> Result<JobResult, ServiceError> {
        self.record(Call::Result(request_id.to_string()));
        if self.script.lock().unwrap().fail_result {
            return Err(transport_error());
        }
        Ok(JobResult {
            rows: Vec::new(),
            extra: [("request_id".to_string(), serde_json::json!(request_id))]
                .into_iter()
                .collect(),
        })
    }

    async fn cancel(&self, request_id: &str) -> Result<(), ServiceError> {
        self.record(Call::Cancel(request_id.to_string()));
        if self.script.lock().unwrap().fail_cancel {
            return Err(transport_error());
        }
        Ok(())
    }
}

pub fn open(origin: &Origin, backend: &Arc<FakeBackend>) -> ContextHandle {
    ContextHandle::open(origin, Services::single(backend.clone()), SifterSettings::default())
}

/// Waits (in virtual time) until the context publishes a matching snapshot.
pub async fn wait_for(
    handle: &ContextHandle,
    mut predicate: impl FnMut(&SessionState) -> bool,
) -> SessionState {
    let mut rx = handle.subscribe();
    let state = tokio::time::timeout(Duration::from_secs(120), rx.wait_for(|s| predicate(s)))
        .await
        .expect("timed out waiting for state")
        .expect("context closed");
    state.clone()
}
