//! `stockgate-events` — event trait and pub/sub seam.
//!
//! Downstream modules (invoicing, accounting) subscribe to the bus; the
//! reservation core only guarantees at-least-once publication, so every
//! subscriber must be idempotent.

pub mod bus;
pub mod event;
pub mod in_memory_bus;

pub use bus::{EventBus, Subscription};
pub use event::Event;
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
