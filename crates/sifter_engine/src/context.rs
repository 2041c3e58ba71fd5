use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use engine_logging::{engine_debug, engine_info, engine_trace, engine_warn};
use sifter_core::{
    update, Effect, FilterField, Msg, RowKey, SessionState, SifterState, WireStatus,
};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Sleep;

use crate::bus::BroadcastBus;
use crate::durable::{DurableStore, MemoryStore, RecordStore};
use crate::services::{JobService, QueryService};
use crate::sync::SyncPropagator;
use crate::ContextId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SifterSettings {
    pub poll_interval: Duration,
    pub storage_key: String,
    pub channel: String,
}

impl Default for SifterSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(750),
            storage_key: "sifter.state.v1".to_string(),
            channel: "sifter-sync".to_string(),
        }
    }
}

/// Backend collaborators of a context.
#[derive(Clone)]
pub struct Services {
    pub query: Arc<dyn QueryService>,
    pub jobs: Arc<dyn JobService>,
}

impl Services {
    pub fn new(query: Arc<dyn QueryService>, jobs: Arc<dyn JobService>) -> Self {
        Self { query, jobs }
    }

    /// Both services served by one backend.
    pub fn single<B>(backend: Arc<B>) -> Self
    where
        B: QueryService + JobService + 'static,
    {
        Self {
            query: backend.clone(),
            jobs: backend,
        }
    }
}

/// The shared substrate of all contexts of one origin: a broadcast bus and
/// a durable store.
#[derive(Clone)]
pub struct Origin {
    bus: BroadcastBus,
    store: Arc<dyn DurableStore>,
    next_id: Arc<AtomicU64>,
}

impl Origin {
    pub fn new(store: Arc<dyn DurableStore>) -> Self {
        Self {
            bus: BroadcastBus::new(256),
            store,
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    pub fn store(&self) -> &Arc<dyn DurableStore> {
        &self.store
    }

    pub fn bus(&self) -> &BroadcastBus {
        &self.bus
    }

    fn next_context_id(&self) -> ContextId {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }
}

enum Command {
    Dispatch(Msg),
    Close,
}

/// Handle to one open context. Every operation is queued to the context's
/// task; state is observed through [`ContextHandle::snapshot`] or
/// [`ContextHandle::subscribe`].
pub struct ContextHandle {
    id: ContextId,
    cmd_tx: mpsc::UnboundedSender<Command>,
    state_rx: watch::Receiver<SessionState>,
    task: JoinHandle<()>,
}

impl ContextHandle {
    /// Loads the durable record and starts the context task.
    ///
    /// Must be called from within a tokio runtime.
    pub fn open(origin: &Origin, services: Services, settings: SifterSettings) -> Self {
        let id = origin.next_context_id();
        let records = RecordStore::new(origin.store.clone(), settings.storage_key.clone());
        let restored = match records.load() {
            Ok(record) => record,
            Err(err) => {
                engine_warn!(ctx = id; "Ignoring unreadable record {}: {}", records.key(), err);
                None
            }
        };
        let port = origin.bus.open(&settings.channel, id);
        let sync = SyncPropagator::new(id, records, port);

        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(SessionState::default());

        let mut actor = ContextActor {
            id,
            state: SifterState::new(),
            services,
            sync,
            poll_interval: settings.poll_interval,
            cmd_rx,
            events_tx,
            events_rx,
            state_tx,
            poll_timer: None,
        };
        if let Some(record) = restored {
            actor.dispatch(Msg::Restore(record));
        }
        engine_info!(ctx = id; "Context opened on channel {}", settings.channel);
        let task = tokio::spawn(actor.run());

        Self {
            id,
            cmd_tx,
            state_rx,
            task,
        }
    }

    pub fn id(&self) -> ContextId {
        self.id
    }

    pub fn set_field(&self, field: FilterField) {
        self.send(Msg::SetField(field));
    }

    pub fn run_query(&self) {
        self.send(Msg::RunQuery);
    }

    pub fn start_job(&self) {
        self.send(Msg::StartJob);
    }

    pub fn cancel_job(&self) {
        self.send(Msg::CancelJob);
    }

    pub fn select(&self, key: RowKey) {
        self.send(Msg::Select(key));
    }

    /// Latest snapshot published by the context.
    pub fn snapshot(&self) -> SessionState {
        self.state_rx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state_rx.clone()
    }

    /// Stops the poller, leaves the bus and waits for the task to finish.
    pub async fn close(self) {
        let _ = self.cmd_tx.send(Command::Close);
        if let Err(err) = self.task.await {
            engine_warn!(ctx = self.id; "Context task ended abnormally: {}", err);
        }
    }

    fn send(&self, msg: Msg) {
        let _ = self.cmd_tx.send(Command::Dispatch(msg));
    }
}

struct ContextActor {
    id: ContextId,
    state: SifterState,
    services: Services,
    sync: SyncPropagator,
    poll_interval: Duration,
    cmd_rx: mpsc::UnboundedReceiver<Command>,
    events_tx: mpsc::UnboundedSender<Msg>,
    events_rx: mpsc::UnboundedReceiver<Msg>,
    state_tx: watch::Sender<SessionState>,
    /// The only poll timer of this context.
    poll_timer: Option<Pin<Box<Sleep>>>,
}

impl ContextActor {
    async fn run(mut self) {
        loop {
            tokio::select! {
                command = self.cmd_rx.recv() => match command {
                    Some(Command::Dispatch(msg)) => self.dispatch(msg),
                    Some(Command::Close) | None => break,
                },
                Some(msg) = self.events_rx.recv() => self.dispatch(msg),
                Some(patch) = self.sync.next_remote() => self.dispatch(Msg::RemotePatch(patch)),
                () = wait_for_timer(&mut self.poll_timer) => {
                    self.poll_timer = None;
                    self.dispatch(Msg::PollTick);
                }
            }
        }

        self.poll_timer = None;
        engine_info!(ctx = self.id; "Context closed");
    }

    fn dispatch(&mut self, msg: Msg) {
        engine_trace!(ctx = self.id; "Dispatch {:?}", msg);
        let state = std::mem::take(&mut self.state);
        let (state, effects) = update(state, msg);
        self.state = state;

        for effect in effects {
            self.run_effect(effect);
        }

        if self.state.consume_dirty() {
            self.state_tx.send_replace(self.state.snapshot().clone());
        }
    }

    fn run_effect(&mut self, effect: Effect) {
        let id = self.id;
        match effect {
            Effect::Propagate(patch) => self.sync.propagate(&patch),
            Effect::ArmPollTimer => {
                self.poll_timer = Some(Box::pin(tokio::time::sleep(self.poll_interval)));
            }
            Effect::StopPollTimer => {
                if self.poll_timer.take().is_some() {
                    engine_debug!(ctx = id; "Poll timer stopped");
                }
            }
            Effect::RunQuery {
                generation,
                request,
            } => {
                let query = self.services.query.clone();
                let events = self.events_tx.clone();
                tokio::spawn(async move {
                    let result = query.run_query(&request).await.map_err(|err| {
                        engine_warn!(ctx = id; "Query failed: {}", err);
                        err.to_string()
                    });
                    let _ = events.send(Msg::QueryCompleted { generation, result });
                });
            }
            Effect::CreateJob {
                generation,
                spec,
                supersedes,
            } => {
                let jobs = self.services.jobs.clone();
                let events = self.events_tx.clone();
                tokio::spawn(async move {
                    if let Some(prior) = supersedes {
                        engine_info!(ctx = id; "Cancelling superseded job {}", prior);
                        if let Err(err) = jobs.cancel(&prior).await {
                            engine_warn!(ctx = id; "Cancel of superseded job {} failed: {}", prior, err);
                        }
                    }
                    let result = jobs.create_job(&spec).await;
                    match &result {
                        Ok(created) => engine_info!(ctx = id; "Job {} created", created.request_id),
                        Err(err) => engine_warn!(ctx = id; "Job creation failed: {}", err),
                    }
                    let _ = events.send(Msg::JobCreated {
                        generation,
                        result: result.map_err(|err| err.to_string()),
                    });
                });
            }
            Effect::CancelJob { request_id } => {
                let jobs = self.services.jobs.clone();
                tokio::spawn(async move {
                    match jobs.cancel(&request_id).await {
                        Ok(()) => engine_info!(ctx = id; "Job {} cancelled", request_id),
                        Err(err) => {
                            engine_warn!(ctx = id; "Cancel of job {} failed: {}", request_id, err)
                        }
                    }
                });
            }
            Effect::PollStatus {
                request_id,
                generation,
            } => {
                let jobs = self.services.jobs.clone();
                let events = self.events_tx.clone();
                tokio::spawn(async move {
                    let result = jobs.get_status(&request_id).await;
                    match &result {
                        Ok(reply) => {
                            if let WireStatus::Unknown(code) = WireStatus::from_code(reply.status) {
                                engine_warn!(ctx = id; "Job {} reported unknown status {}, still polling", request_id, code);
                            }
                            engine_debug!(ctx = id; "Job {} status {} progress {:?}", request_id, reply.status, reply.progress);
                        }
                        Err(err) => engine_warn!(ctx = id; "Status of job {} unavailable: {}", request_id, err),
                    }
                    let _ = events.send(Msg::StatusReceived {
                        request_id,
                        generation,
                        result: result.map_err(|err| err.to_string()),
                    });
                });
            }
            Effect::FetchResult { request_id } => {
                let jobs = self.services.jobs.clone();
                let events = self.events_tx.clone();
                tokio::spawn(async move {
                    let result = jobs.get_result(&request_id).await.map_err(|err| {
                        engine_warn!(ctx = id; "Result of job {} unavailable: {}", request_id, err);
                        err.to_string()
                    });
                    let _ = events.send(Msg::ResultFetched { request_id, result });
                });
            }
        }
    }
}

async fn wait_for_timer(timer: &mut Option<Pin<Box<Sleep>>>) {
    match timer {
        Some(sleep) => sleep.as_mut().await,
        None => std::future::pending().await,
    }
}
