//! Ledger store contract: atomic read-modify-write, nothing else.

use std::sync::Arc;

use stockgate_core::{Sku, StockResult, WarehouseId};

use crate::entry::{StockCounts, StockLedgerEntry};

/// Durable store of authoritative stock counts.
///
/// The store holds no business logic. Its one obligation is the
/// optimistic-concurrency contract of `compare_and_swap`: a swap succeeds
/// only against the version the caller read, so concurrent writers cannot
/// silently overwrite each other. Any backend with a version column and a
/// conditional update satisfies this contract.
pub trait LedgerStore: Send + Sync {
    /// Read the current row, or `NotFound` for an unknown SKU/warehouse
    /// pair.
    fn read(&self, sku: &Sku, warehouse_id: WarehouseId) -> StockResult<StockLedgerEntry>;

    /// Install `new_counts` iff the stored version equals
    /// `expected_version`.
    ///
    /// On success the version is incremented and the new row returned. On
    /// a stale version the store fails with `VersionConflict` and the
    /// caller must re-read and retry. Counts violating
    /// `reserved <= on_hand` are rejected with `Validation` before any
    /// write.
    fn compare_and_swap(
        &self,
        sku: &Sku,
        warehouse_id: WarehouseId,
        expected_version: u64,
        new_counts: StockCounts,
    ) -> StockResult<StockLedgerEntry>;

    /// Provision or replenish a row (seeding path, not the reservation
    /// path). Overwrites any existing row for the key.
    fn put(&self, entry: StockLedgerEntry) -> StockResult<()>;
}

impl<S> LedgerStore for Arc<S>
where
    S: LedgerStore + ?Sized,
{
    fn read(&self, sku: &Sku, warehouse_id: WarehouseId) -> StockResult<StockLedgerEntry> {
        (**self).read(sku, warehouse_id)
    }

    fn compare_and_swap(
        &self,
        sku: &Sku,
        warehouse_id: WarehouseId,
        expected_version: u64,
        new_counts: StockCounts,
    ) -> StockResult<StockLedgerEntry> {
        (**self).compare_and_swap(sku, warehouse_id, expected_version, new_counts)
    }

    fn put(&self, entry: StockLedgerEntry) -> StockResult<()> {
        (**self).put(entry)
    }
}
