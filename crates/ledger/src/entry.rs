//! Ledger records: per-SKU, per-warehouse stock counts with a version.

use serde::{Deserialize, Serialize};

use stockgate_core::{Sku, StockError, StockResult, WarehouseId};

/// Key of one ledger row: a SKU held at a warehouse.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LedgerKey {
    pub sku: Sku,
    pub warehouse_id: WarehouseId,
}

impl LedgerKey {
    pub fn new(sku: Sku, warehouse_id: WarehouseId) -> Self {
        Self { sku, warehouse_id }
    }
}

impl core::fmt::Display for LedgerKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}@{}", self.sku, self.warehouse_id)
    }
}

/// The pair of counts a compare-and-swap installs atomically.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockCounts {
    pub on_hand: u64,
    pub reserved: u64,
}

impl StockCounts {
    /// Invariant of every ledger row: holds never exceed physical stock.
    pub fn check(&self) -> StockResult<()> {
        if self.reserved > self.on_hand {
            return Err(StockError::validation(format!(
                "reserved ({}) cannot exceed on_hand ({})",
                self.reserved, self.on_hand
            )));
        }
        Ok(())
    }
}

/// One authoritative ledger row.
///
/// Mutated exclusively through [`crate::LedgerStore::compare_and_swap`];
/// `version` increases by one on every successful swap, which totally
/// orders all writes to this key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockLedgerEntry {
    pub sku: Sku,
    pub warehouse_id: WarehouseId,
    pub on_hand: u64,
    pub reserved: u64,
    pub version: u64,
}

impl StockLedgerEntry {
    pub fn new(sku: Sku, warehouse_id: WarehouseId, on_hand: u64) -> Self {
        Self {
            sku,
            warehouse_id,
            on_hand,
            reserved: 0,
            version: 1,
        }
    }

    pub fn key(&self) -> LedgerKey {
        LedgerKey::new(self.sku.clone(), self.warehouse_id)
    }

    pub fn counts(&self) -> StockCounts {
        StockCounts {
            on_hand: self.on_hand,
            reserved: self.reserved,
        }
    }

    /// Units still free to reserve.
    pub fn available(&self) -> u64 {
        self.on_hand.saturating_sub(self.reserved)
    }
}
