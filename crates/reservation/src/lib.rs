//! `stockgate-reservation` — the reserve → confirm/release lifecycle.
//!
//! The [`ReservationManager`] is the only writer of ledger counts. It
//! guarantees that under any interleaving of concurrent reserves, at most
//! one request per unit of stock succeeds (first committer wins), without
//! holding locks across storage access.

pub mod events;
pub mod manager;
pub mod reservation;
pub mod sweeper;

pub use events::{
    StockCommitted, StockEvent, StockReleased, StockReservationFailed, StockReserved,
};
pub use manager::{ReservationConfig, ReservationManager};
pub use reservation::{
    InMemoryReservationStore, Reservation, ReservationStatus, ReservationStore,
};
pub use sweeper::{Sweeper, SweeperConfig, SweeperHandle};
