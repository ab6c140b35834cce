//! `stockgate-outbox` — durable client-side queue of offline mutations.
//!
//! Operations captured while disconnected are persisted here and drained
//! by the sync coordinator when connectivity returns. The queue is local
//! to one device and never shared; conflicts are resolved server-side
//! during sync, never by merging client states.

pub mod operation;
pub mod store;

pub use operation::{OperationKind, OrderLine, OutboxOperation, SyncStatus};
pub use store::OutboxStore;
