//! Sifter engine: context tasks, effect execution, backend bindings and
//! cross-context synchronization.
mod bus;
mod context;
mod durable;
mod http;
mod services;
mod sync;

/// Identifies one open context within an origin.
pub type ContextId = u64;

pub use bus::{BroadcastBus, BusPort};
pub use context::{ContextHandle, Origin, Services, SifterSettings};
pub use durable::{
    decode_record, encode_record, DurableStore, FileStore, MemoryStore, RecordStore, StoreChange,
    StoreError,
};
pub use http::{BackendSettings, HttpBackend};
pub use services::{JobService, QueryService, ServiceError, ServiceErrorKind};
pub use sync::{SyncMessage, SyncPropagator};
