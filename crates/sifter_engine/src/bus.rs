use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use engine_logging::engine_warn;
use tokio::sync::broadcast::{self, error::RecvError};

use crate::ContextId;

#[derive(Debug, Clone)]
struct Frame {
    sender: ContextId,
    text: Arc<str>,
}

/// Best-effort same-origin pub/sub. Nothing is persisted, slow receivers
/// lose frames, and a context never receives its own frames.
#[derive(Debug, Clone)]
pub struct BroadcastBus {
    channels: Arc<Mutex<HashMap<String, broadcast::Sender<Frame>>>>,
    capacity: usize,
}

impl BroadcastBus {
    pub fn new(capacity: usize) -> Self {
        Self {
            channels: Arc::new(Mutex::new(HashMap::new())),
            capacity: capacity.max(1),
        }
    }

    /// Joins the named channel as context `id`.
    pub fn open(&self, channel: &str, id: ContextId) -> BusPort {
        let mut channels = self.channels.lock().unwrap_or_else(PoisonError::into_inner);
        let tx = channels
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .clone();
        let rx = tx.subscribe();
        BusPort {
            id,
            channel: channel.to_string(),
            tx,
            rx,
        }
    }
}

/// One context's membership in a bus channel. Dropping it unsubscribes.
#[derive(Debug)]
pub struct BusPort {
    id: ContextId,
    channel: String,
    tx: broadcast::Sender<Frame>,
    rx: broadcast::Receiver<Frame>,
}

impl BusPort {
    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn publish(&self, text: &str) {
        // Fire-and-forget: no other subscribers is not an error.
        let _ = self.tx.send(Frame {
            sender: self.id,
            text: Arc::from(text),
        });
    }

    /// Next frame published by another context, or `None` once the channel is gone.
    pub async fn recv(&mut self) -> Option<Arc<str>> {
        loop {
            match self.rx.recv().await {
                Ok(frame) if frame.sender == self.id => continue,
                Ok(frame) => return Some(frame.text),
                Err(RecvError::Lagged(skipped)) => {
                    engine_warn!(ctx = self.id; "Bus {} lagged, {} frames dropped", self.channel, skipped);
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }
}
