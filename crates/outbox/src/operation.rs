//! Outbox operations: typed payloads, not raw JSON blobs.
//!
//! Each operation kind carries its own strongly-typed payload behind a
//! serde tag, so the sync boundary stays type-safe end to end.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use stockgate_core::{OperationId, Sku, WarehouseId};

/// One line of an order captured offline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub sku: Sku,
    pub quantity: u64,
    pub unit_price_cents: i64,
}

/// The mutation a device intends to apply once it is back online.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OperationKind {
    CreateOrder {
        order_id: Uuid,
        lines: Vec<OrderLine>,
    },
    AddPayment {
        order_id: Uuid,
        amount_cents: i64,
    },
    ReserveStock {
        sku: Sku,
        warehouse_id: WarehouseId,
        quantity: u64,
    },
    CheckInAttendance {
        employee_id: Uuid,
        at: DateTime<Utc>,
    },
}

impl OperationKind {
    /// Stable operation name (logging / server routing).
    pub fn type_name(&self) -> &'static str {
        match self {
            OperationKind::CreateOrder { .. } => "order.create",
            OperationKind::AddPayment { .. } => "order.add_payment",
            OperationKind::ReserveStock { .. } => "stock.reserve",
            OperationKind::CheckInAttendance { .. } => "attendance.check_in",
        }
    }

    /// The local entity this operation touches.
    ///
    /// Operations sharing a key must replay strictly in creation order
    /// ("create order" before "add payment"); distinct keys are
    /// independent and may sync concurrently.
    pub fn entity_key(&self) -> String {
        match self {
            OperationKind::CreateOrder { order_id, .. } => format!("order:{order_id}"),
            OperationKind::AddPayment { order_id, .. } => format!("order:{order_id}"),
            OperationKind::ReserveStock {
                sku, warehouse_id, ..
            } => format!("stock:{warehouse_id}:{sku}"),
            OperationKind::CheckInAttendance { employee_id, .. } => {
                format!("employee:{employee_id}")
            }
        }
    }
}

/// Sync lifecycle of a queued operation.
///
/// `PendingSync → Syncing → {Synced | Conflict | Failed}`; `Failed` may
/// re-enter `PendingSync` through a manual retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    PendingSync,
    Syncing,
    Synced,
    Conflict,
    Failed,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::PendingSync => "PendingSync",
            SyncStatus::Syncing => "Syncing",
            SyncStatus::Synced => "Synced",
            SyncStatus::Conflict => "Conflict",
            SyncStatus::Failed => "Failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PendingSync" => Some(SyncStatus::PendingSync),
            "Syncing" => Some(SyncStatus::Syncing),
            "Synced" => Some(SyncStatus::Synced),
            "Conflict" => Some(SyncStatus::Conflict),
            "Failed" => Some(SyncStatus::Failed),
            _ => None,
        }
    }

    /// Synced and Conflict rows are never picked up again by the drain;
    /// Failed rows wait for a manual retry.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SyncStatus::Synced | SyncStatus::Conflict)
    }
}

/// A queued operation with its client-generated idempotency id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboxOperation {
    pub id: OperationId,
    pub kind: OperationKind,
    pub created_at: DateTime<Utc>,
    pub status: SyncStatus,
    pub attempts: u32,
    pub last_error: Option<String>,
    pub synced_at: Option<DateTime<Utc>>,
}

impl OutboxOperation {
    pub fn entity_key(&self) -> String {
        self.kind.entity_key()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_operations_share_an_entity_key() {
        let order_id = Uuid::now_v7();
        let create = OperationKind::CreateOrder {
            order_id,
            lines: vec![],
        };
        let pay = OperationKind::AddPayment {
            order_id,
            amount_cents: 500,
        };
        assert_eq!(create.entity_key(), pay.entity_key());

        let other = OperationKind::AddPayment {
            order_id: Uuid::now_v7(),
            amount_cents: 500,
        };
        assert_ne!(create.entity_key(), other.entity_key());
    }

    #[test]
    fn kind_round_trips_through_tagged_json() {
        let kind = OperationKind::ReserveStock {
            sku: Sku::new("WIDGET-01").unwrap(),
            warehouse_id: WarehouseId::new(),
            quantity: 3,
        };
        let json = serde_json::to_string(&kind).unwrap();
        assert!(json.contains("\"kind\":\"reserve_stock\""));

        let back: OperationKind = serde_json::from_str(&json).unwrap();
        assert_eq!(back, kind);
    }

    #[test]
    fn status_strings_round_trip() {
        for status in [
            SyncStatus::PendingSync,
            SyncStatus::Syncing,
            SyncStatus::Synced,
            SyncStatus::Conflict,
            SyncStatus::Failed,
        ] {
            assert_eq!(SyncStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(SyncStatus::parse("Bogus"), None);
    }
}
