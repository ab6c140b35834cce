//! In-memory ledger store.
//!
//! Intended for tests/dev and as the reference implementation of the
//! compare-and-swap contract. Not optimized for performance.

use std::collections::HashMap;
use std::sync::RwLock;

use stockgate_core::{Sku, StockError, StockResult, WarehouseId};

use crate::entry::{LedgerKey, StockCounts, StockLedgerEntry};
use crate::store::LedgerStore;

#[derive(Debug, Default)]
pub struct InMemoryLedgerStore {
    rows: RwLock<HashMap<LedgerKey, StockLedgerEntry>>,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LedgerStore for InMemoryLedgerStore {
    fn read(&self, sku: &Sku, warehouse_id: WarehouseId) -> StockResult<StockLedgerEntry> {
        let rows = self
            .rows
            .read()
            .map_err(|_| StockError::invalid_state("ledger lock poisoned"))?;

        let key = LedgerKey::new(sku.clone(), warehouse_id);
        rows.get(&key).cloned().ok_or(StockError::NotFound)
    }

    fn compare_and_swap(
        &self,
        sku: &Sku,
        warehouse_id: WarehouseId,
        expected_version: u64,
        new_counts: StockCounts,
    ) -> StockResult<StockLedgerEntry> {
        new_counts.check()?;

        let mut rows = self
            .rows
            .write()
            .map_err(|_| StockError::invalid_state("ledger lock poisoned"))?;

        let key = LedgerKey::new(sku.clone(), warehouse_id);
        let row = rows.get_mut(&key).ok_or(StockError::NotFound)?;

        if row.version != expected_version {
            return Err(StockError::VersionConflict {
                expected: expected_version,
                found: row.version,
            });
        }

        row.on_hand = new_counts.on_hand;
        row.reserved = new_counts.reserved;
        row.version += 1;

        Ok(row.clone())
    }

    fn put(&self, entry: StockLedgerEntry) -> StockResult<()> {
        entry.counts().check()?;

        let mut rows = self
            .rows
            .write()
            .map_err(|_| StockError::invalid_state("ledger lock poisoned"))?;

        rows.insert(entry.key(), entry);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use proptest::prelude::*;

    use super::*;

    fn sku() -> Sku {
        Sku::new("WIDGET-01").unwrap()
    }

    fn seeded(on_hand: u64) -> (InMemoryLedgerStore, Sku, WarehouseId) {
        let store = InMemoryLedgerStore::new();
        let sku = sku();
        let warehouse = WarehouseId::new();
        store
            .put(StockLedgerEntry::new(sku.clone(), warehouse, on_hand))
            .unwrap();
        (store, sku, warehouse)
    }

    #[test]
    fn read_unknown_key_is_not_found() {
        let store = InMemoryLedgerStore::new();
        let err = store.read(&sku(), WarehouseId::new()).unwrap_err();
        assert_eq!(err, StockError::NotFound);
    }

    #[test]
    fn cas_succeeds_against_current_version_and_bumps_it() {
        let (store, sku, warehouse) = seeded(5);
        let entry = store.read(&sku, warehouse).unwrap();
        assert_eq!(entry.version, 1);

        let updated = store
            .compare_and_swap(
                &sku,
                warehouse,
                entry.version,
                StockCounts {
                    on_hand: 5,
                    reserved: 3,
                },
            )
            .unwrap();

        assert_eq!(updated.version, 2);
        assert_eq!(updated.reserved, 3);
        assert_eq!(updated.available(), 2);
    }

    #[test]
    fn cas_with_stale_version_is_a_version_conflict() {
        let (store, sku, warehouse) = seeded(5);
        let entry = store.read(&sku, warehouse).unwrap();

        store
            .compare_and_swap(
                &sku,
                warehouse,
                entry.version,
                StockCounts {
                    on_hand: 5,
                    reserved: 1,
                },
            )
            .unwrap();

        // Second writer still holds the old version.
        let err = store
            .compare_and_swap(
                &sku,
                warehouse,
                entry.version,
                StockCounts {
                    on_hand: 5,
                    reserved: 2,
                },
            )
            .unwrap_err();

        assert_eq!(
            err,
            StockError::VersionConflict {
                expected: 1,
                found: 2
            }
        );
    }

    #[test]
    fn cas_rejects_counts_violating_the_invariant() {
        let (store, sku, warehouse) = seeded(2);
        let err = store
            .compare_and_swap(
                &sku,
                warehouse,
                1,
                StockCounts {
                    on_hand: 2,
                    reserved: 3,
                },
            )
            .unwrap_err();
        assert!(matches!(err, StockError::Validation(_)));

        // Nothing was written, version included.
        let entry = store.read(&sku, warehouse).unwrap();
        assert_eq!(entry.version, 1);
        assert_eq!(entry.reserved, 0);
    }

    #[test]
    fn concurrent_writers_with_re_read_retry_all_land() {
        let (store, sku, warehouse) = seeded(1000);
        let store = Arc::new(store);

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            let sku = sku.clone();
            handles.push(std::thread::spawn(move || {
                for _ in 0..50 {
                    loop {
                        let entry = store.read(&sku, warehouse).unwrap();
                        let counts = StockCounts {
                            on_hand: entry.on_hand,
                            reserved: entry.reserved + 1,
                        };
                        match store.compare_and_swap(&sku, warehouse, entry.version, counts) {
                            Ok(_) => break,
                            Err(StockError::VersionConflict { .. }) => continue,
                            Err(other) => panic!("unexpected error: {other}"),
                        }
                    }
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }

        let entry = store.read(&sku, warehouse).unwrap();
        // 8 threads x 50 increments, each landing exactly once.
        assert_eq!(entry.reserved, 400);
        assert_eq!(entry.version, 401);
    }

    proptest! {
        /// Successive successful swaps are totally ordered by version and
        /// never break `reserved <= on_hand`.
        #[test]
        fn versions_increase_by_one_per_successful_swap(
            reserves in prop::collection::vec(0u64..10, 1..40)
        ) {
            let (store, sku, warehouse) = seeded(10);

            let mut last_version = store.read(&sku, warehouse).unwrap().version;
            for quantity in reserves {
                let entry = store.read(&sku, warehouse).unwrap();
                let counts = StockCounts {
                    on_hand: entry.on_hand,
                    reserved: quantity.min(entry.on_hand),
                };
                let updated = store
                    .compare_and_swap(&sku, warehouse, entry.version, counts)
                    .unwrap();

                prop_assert_eq!(updated.version, last_version + 1);
                prop_assert!(updated.reserved <= updated.on_hand);
                last_version = updated.version;
            }
        }
    }
}
