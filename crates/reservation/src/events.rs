//! Domain events published by the reservation manager.
//!
//! Published after the state change they describe; delivery is
//! at-least-once, so downstream consumers (invoicing, accounting)
//! deduplicate by `reservation_id` + event type.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockgate_core::{ReservationId, Sku, WarehouseId};
use stockgate_events::Event;

/// Event: a hold was placed against stock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockReserved {
    pub reservation_id: ReservationId,
    pub sku: Sku,
    pub warehouse_id: WarehouseId,
    pub quantity: u64,
    pub expires_at: DateTime<Utc>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: a reserve request was refused (insufficient stock or
/// contention). Carries the human-readable reason for downstream alerting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockReservationFailed {
    pub sku: Sku,
    pub warehouse_id: WarehouseId,
    pub quantity: u64,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

/// Event: a pending hold was confirmed and the units left the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockCommitted {
    pub reservation_id: ReservationId,
    pub sku: Sku,
    pub warehouse_id: WarehouseId,
    pub quantity: u64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: a hold was released back to available stock (cancellation or
/// expiry sweep).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockReleased {
    pub reservation_id: ReservationId,
    pub sku: Sku,
    pub warehouse_id: WarehouseId,
    pub quantity: u64,
    pub expired: bool,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StockEvent {
    StockReserved(StockReserved),
    StockReservationFailed(StockReservationFailed),
    StockCommitted(StockCommitted),
    StockReleased(StockReleased),
}

impl Event for StockEvent {
    fn event_type(&self) -> &'static str {
        match self {
            StockEvent::StockReserved(_) => "stock.reserved",
            StockEvent::StockReservationFailed(_) => "stock.reservation_failed",
            StockEvent::StockCommitted(_) => "stock.committed",
            StockEvent::StockReleased(_) => "stock.released",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            StockEvent::StockReserved(e) => e.occurred_at,
            StockEvent::StockReservationFailed(e) => e.occurred_at,
            StockEvent::StockCommitted(e) => e.occurred_at,
            StockEvent::StockReleased(e) => e.occurred_at,
        }
    }
}
