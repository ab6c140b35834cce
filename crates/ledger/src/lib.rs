//! `stockgate-ledger` — authoritative per-SKU stock counts.
//!
//! The ledger is the **single writer of truth** for stock quantities.
//! Nothing else caches authoritative counts; everything that mutates them
//! goes through [`LedgerStore::compare_and_swap`], the sole synchronization
//! primitive of the core. No locks are held across I/O.

pub mod entry;
pub mod in_memory;
pub mod store;

pub use entry::{LedgerKey, StockCounts, StockLedgerEntry};
pub use in_memory::InMemoryLedgerStore;
pub use store::LedgerStore;
