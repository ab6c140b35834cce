//! `stockgate-sync` — drains the offline outbox against the server.
//!
//! Replay is idempotent (client-generated operation ids travel with every
//! request) and ordered per entity: operations touching the same order,
//! stock line, or employee apply strictly in creation order, while
//! unrelated entities sync concurrently.

pub mod coordinator;
pub mod transport;

pub use coordinator::{SyncConfig, SyncCoordinator, SyncReport};
pub use transport::{HttpTransport, InMemoryTransport, SyncTransport, TransportError};
