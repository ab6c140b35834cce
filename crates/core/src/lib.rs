//! `stockgate-core` — shared primitives of the stock-reservation core.
//!
//! This crate contains **pure domain** building blocks (ids, the SKU value
//! object, the error taxonomy). No storage, no network, no async.

pub mod error;
pub mod id;
pub mod sku;

pub use error::{StockError, StockResult};
pub use id::{OperationId, ReservationId, WarehouseId};
pub use sku::Sku;
