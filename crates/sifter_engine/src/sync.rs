use engine_logging::{engine_debug, engine_warn};
use serde::{Deserialize, Serialize};
use sifter_core::Patch;
use tokio::runtime::{Handle, RuntimeFlavor};
use tokio::sync::broadcast::{self, error::RecvError};

use crate::bus::BusPort;
use crate::durable::{decode_record, RecordStore, StoreChange, StoreError};
use crate::ContextId;

/// Bus message: `{"type": "SYNC_STATE", "payload": <patch>}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum SyncMessage {
    #[serde(rename = "SYNC_STATE")]
    SyncState(Patch),
}

/// Persists and broadcasts local patches; collects patches from siblings.
pub struct SyncPropagator {
    context: ContextId,
    records: RecordStore,
    port: BusPort,
    changes: Option<broadcast::Receiver<StoreChange>>,
}

impl SyncPropagator {
    pub fn new(context: ContextId, records: RecordStore, port: BusPort) -> Self {
        let changes = records.subscribe();
        Self {
            context,
            records,
            port,
            changes,
        }
    }

    pub fn records(&self) -> &RecordStore {
        &self.records
    }

    /// Best-effort: failures are logged, never surfaced.
    pub fn propagate(&self, patch: &Patch) {
        match self.write_record(patch) {
            Ok(true) => engine_debug!(ctx = self.context; "Record {} updated", self.records.key()),
            Ok(false) => {}
            Err(err) => engine_warn!(ctx = self.context; "Failed to persist patch: {}", err),
        }

        match serde_json::to_string(&SyncMessage::SyncState(patch.clone())) {
            Ok(text) => self.port.publish(&text),
            Err(err) => engine_warn!(ctx = self.context; "Failed to encode patch: {}", err),
        }
    }

    /// Writes run in dispatch order. Blocking stores are written inside
    /// `block_in_place`, which panics on a current-thread runtime; there the
    /// write runs inline.
    fn write_record(&self, patch: &Patch) -> Result<bool, StoreError> {
        let multi_thread = Handle::try_current()
            .is_ok_and(|handle| handle.runtime_flavor() == RuntimeFlavor::MultiThread);
        if self.records.is_blocking() && multi_thread {
            tokio::task::block_in_place(|| self.records.merge_write(self.context, patch))
        } else {
            self.records.merge_write(self.context, patch)
        }
    }

    /// Next patch written by another context, from the bus or the durable store.
    ///
    /// Returns `None` once neither source can deliver anything more.
    pub async fn next_remote(&mut self) -> Option<Patch> {
        let mut bus_open = true;
        loop {
            tokio::select! {
                text = self.port.recv(), if bus_open => match text {
                    Some(text) => {
                        if let Some(patch) = self.decode_frame(&text) {
                            return Some(patch);
                        }
                    }
                    None => bus_open = false,
                },
                change = recv_change(&mut self.changes), if self.changes.is_some() => match change {
                    Ok(change) => {
                        if let Some(patch) = self.patch_from_change(change) {
                            return Some(patch);
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        engine_warn!(ctx = self.context; "Store notifications lagged, {} dropped", skipped);
                    }
                    Err(RecvError::Closed) => self.changes = None,
                },
                else => return None,
            }
        }
    }

    fn decode_frame(&self, text: &str) -> Option<Patch> {
        match serde_json::from_str::<SyncMessage>(text) {
            Ok(SyncMessage::SyncState(patch)) => Some(patch),
            Err(err) => {
                engine_warn!(ctx = self.context; "Ignoring bus frame on {}: {}", self.port.channel(), err);
                None
            }
        }
    }

    fn patch_from_change(&self, change: StoreChange) -> Option<Patch> {
        if change.key != self.records.key() || change.writer == self.context {
            return None;
        }
        let new = match decode_record(&change.new_value) {
            Ok(record) => record,
            Err(err) => {
                engine_warn!(ctx = self.context; "Ignoring unreadable record change: {}", err);
                return None;
            }
        };
        let old = change
            .old_value
            .as_deref()
            .and_then(|text| decode_record(text).ok())
            .unwrap_or_default();
        let patch = new.changes_since(&old);
        (!patch.is_empty()).then_some(patch)
    }
}

async fn recv_change(
    changes: &mut Option<broadcast::Receiver<StoreChange>>,
) -> Result<StoreChange, RecvError> {
    match changes {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}
