//! Reservation manager: orchestration of the hold lifecycle.
//!
//! All ledger mutations funnel through a bounded compare-and-swap retry
//! loop. `VersionConflict` never escapes this module; callers see
//! `InsufficientStock`, `Contention`, `NotFound` or `InvalidState`.

use std::time::Instant;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, warn};

use stockgate_core::{ReservationId, Sku, StockError, StockResult, WarehouseId};
use stockgate_events::EventBus;
use stockgate_ledger::{LedgerStore, StockCounts, StockLedgerEntry};

use crate::events::{
    StockCommitted, StockEvent, StockReleased, StockReservationFailed, StockReserved,
};
use crate::reservation::{Reservation, ReservationStatus, ReservationStore};

/// Tunables of the reservation path. Deployment configuration, never
/// hardcoded at call sites.
#[derive(Debug, Clone)]
pub struct ReservationConfig {
    /// CAS attempts per operation, each against a freshly re-read version.
    pub max_retries: u32,
    /// TTL applied when `reserve` is called without an explicit one.
    pub default_ttl: Duration,
}

impl Default for ReservationConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            default_ttl: Duration::minutes(15),
        }
    }
}

impl ReservationConfig {
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }
}

/// Executes atomic reserve/confirm/release against the ledger store.
///
/// Invoked by concurrent request-handling workers; spawns no threads of
/// its own and holds no locks across storage access. The ledger's CAS is
/// the sole synchronization primitive, so two racing reserves for the
/// last unit are decided by whichever swap lands first.
pub struct ReservationManager<L, R, B> {
    ledger: L,
    reservations: R,
    bus: B,
    config: ReservationConfig,
}

impl<L, R, B> ReservationManager<L, R, B>
where
    L: LedgerStore,
    R: ReservationStore,
    B: EventBus<StockEvent>,
{
    pub fn new(ledger: L, reservations: R, bus: B) -> Self {
        Self::with_config(ledger, reservations, bus, ReservationConfig::default())
    }

    pub fn with_config(ledger: L, reservations: R, bus: B, config: ReservationConfig) -> Self {
        Self {
            ledger,
            reservations,
            bus,
            config,
        }
    }

    /// Place a hold of `quantity` units.
    ///
    /// Fails with `InsufficientStock` when fewer than `quantity` units are
    /// available, and with `Contention` when the CAS retry budget or the
    /// caller-supplied `deadline` runs out. On success the returned
    /// reservation is `Pending` until confirmed, released or swept.
    pub fn reserve(
        &self,
        sku: &Sku,
        warehouse_id: WarehouseId,
        quantity: u64,
        ttl: Option<Duration>,
        deadline: Option<Instant>,
    ) -> StockResult<Reservation> {
        if quantity == 0 {
            return Err(StockError::validation("quantity must be positive"));
        }

        let swapped = self.swap_with_retry(sku, warehouse_id, deadline, |entry| {
            let available = entry.available();
            if available < quantity {
                return Err(StockError::InsufficientStock {
                    requested: quantity,
                    available,
                });
            }
            Ok(StockCounts {
                on_hand: entry.on_hand,
                reserved: entry.reserved + quantity,
            })
        });

        match swapped {
            Ok(entry) => {
                let now = Utc::now();
                let reservation = Reservation::new(
                    ReservationId::new(),
                    sku.clone(),
                    warehouse_id,
                    quantity,
                    now,
                    now + ttl.unwrap_or(self.config.default_ttl),
                );
                self.reservations.insert(reservation.clone())?;

                debug!(
                    reservation_id = %reservation.id,
                    sku = %sku,
                    quantity,
                    reserved = entry.reserved,
                    version = entry.version,
                    "stock reserved"
                );
                self.publish(StockEvent::StockReserved(StockReserved {
                    reservation_id: reservation.id,
                    sku: sku.clone(),
                    warehouse_id,
                    quantity,
                    expires_at: reservation.expires_at,
                    occurred_at: now,
                }));
                Ok(reservation)
            }
            Err(err @ (StockError::InsufficientStock { .. } | StockError::Contention)) => {
                self.publish(StockEvent::StockReservationFailed(StockReservationFailed {
                    sku: sku.clone(),
                    warehouse_id,
                    quantity,
                    reason: err.to_string(),
                    occurred_at: Utc::now(),
                }));
                Err(err)
            }
            Err(other) => Err(other),
        }
    }

    /// Confirm a pending, non-expired reservation.
    ///
    /// Terminal and irreversible as a sale: the sold units leave the
    /// ledger (`on_hand` and `reserved` both drop), and `stock.committed`
    /// is published. Releasing a confirmed reservation afterwards models a
    /// return and puts the units back on hand.
    pub fn confirm(&self, id: ReservationId) -> StockResult<Reservation> {
        let reservation = self.reservations.get(id)?.ok_or(StockError::NotFound)?;
        let now = Utc::now();

        match reservation.status {
            ReservationStatus::Pending if reservation.is_expired(now) => Err(
                StockError::invalid_state("reservation has expired and awaits the sweep"),
            ),
            ReservationStatus::Pending => {
                // Claim the transition first; the winner alone mutates the
                // ledger, so a racing release or sweep cannot double-count.
                let Some(claimed) = self.reservations.transition(
                    id,
                    ReservationStatus::Pending,
                    ReservationStatus::Confirmed,
                )?
                else {
                    return Err(StockError::invalid_state(
                        "reservation changed state concurrently",
                    ));
                };

                let quantity = claimed.quantity;
                let swapped =
                    self.swap_with_retry(&claimed.sku, claimed.warehouse_id, None, |entry| {
                        let on_hand = entry.on_hand.checked_sub(quantity).ok_or_else(|| {
                            StockError::invalid_state("ledger on_hand underflow on confirm")
                        })?;
                        let reserved = entry.reserved.checked_sub(quantity).ok_or_else(|| {
                            StockError::invalid_state("ledger reserved underflow on confirm")
                        })?;
                        Ok(StockCounts { on_hand, reserved })
                    });
                if let Err(err) = swapped {
                    self.unclaim(id, ReservationStatus::Confirmed, ReservationStatus::Pending);
                    return Err(err);
                }

                debug!(reservation_id = %id, quantity, "reservation confirmed");
                self.publish(StockEvent::StockCommitted(StockCommitted {
                    reservation_id: id,
                    sku: claimed.sku.clone(),
                    warehouse_id: claimed.warehouse_id,
                    quantity,
                    occurred_at: now,
                }));
                Ok(claimed)
            }
            other => Err(StockError::invalid_state(format!(
                "cannot confirm a {} reservation",
                other.as_str()
            ))),
        }
    }

    /// Release a reservation back to available stock.
    ///
    /// Valid from `Pending` (cancellation of a hold) and `Confirmed`
    /// (return of a sale). Idempotent: releasing a `Released` or `Expired`
    /// reservation is a no-op, not an error.
    pub fn release(&self, id: ReservationId) -> StockResult<Reservation> {
        // Claim-then-mutate: only the thread whose status transition lands
        // touches the ledger. A claimant that loses the race re-reads and
        // lands in the idempotent no-op arm.
        loop {
            let reservation = self.reservations.get(id)?.ok_or(StockError::NotFound)?;
            let quantity = reservation.quantity;

            match reservation.status {
                ReservationStatus::Released | ReservationStatus::Expired => {
                    debug!(reservation_id = %id, "release of a terminal reservation is a no-op");
                    return Ok(reservation);
                }
                ReservationStatus::Pending => {
                    let Some(claimed) = self.reservations.transition(
                        id,
                        ReservationStatus::Pending,
                        ReservationStatus::Released,
                    )?
                    else {
                        continue;
                    };

                    let swapped =
                        self.swap_with_retry(&claimed.sku, claimed.warehouse_id, None, |entry| {
                            let reserved = entry.reserved.checked_sub(quantity).ok_or_else(|| {
                                StockError::invalid_state("ledger reserved underflow on release")
                            })?;
                            Ok(StockCounts {
                                on_hand: entry.on_hand,
                                reserved,
                            })
                        });
                    if let Err(err) = swapped {
                        self.unclaim(id, ReservationStatus::Released, ReservationStatus::Pending);
                        return Err(err);
                    }
                    return self.finish_release(claimed, false);
                }
                ReservationStatus::Confirmed => {
                    let Some(claimed) = self.reservations.transition(
                        id,
                        ReservationStatus::Confirmed,
                        ReservationStatus::Released,
                    )?
                    else {
                        continue;
                    };

                    let swapped =
                        self.swap_with_retry(&claimed.sku, claimed.warehouse_id, None, |entry| {
                            Ok(StockCounts {
                                on_hand: entry.on_hand + quantity,
                                reserved: entry.reserved,
                            })
                        });
                    if let Err(err) = swapped {
                        self.unclaim(id, ReservationStatus::Released, ReservationStatus::Confirmed);
                        return Err(err);
                    }
                    return self.finish_release(claimed, false);
                }
            }
        }
    }

    /// Release all pending reservations past their expiry, marking them
    /// `Expired`. Returns the number released.
    ///
    /// Invoked periodically by an external scheduler (or the [`crate::Sweeper`]
    /// convenience host); a row that fails here stays `Pending` and is
    /// retried on the next sweep.
    pub fn sweep_expired(&self, now: DateTime<Utc>) -> StockResult<usize> {
        let expired = self.reservations.pending_expired_before(now)?;
        let mut released = 0usize;

        for reservation in expired {
            let quantity = reservation.quantity;

            // Claim Pending -> Expired before touching the ledger; a hold
            // released or confirmed since the scan simply loses the claim.
            let Some(claimed) = self.reservations.transition(
                reservation.id,
                ReservationStatus::Pending,
                ReservationStatus::Expired,
            )?
            else {
                continue;
            };

            let swapped =
                self.swap_with_retry(&claimed.sku, claimed.warehouse_id, None, |entry| {
                    let reserved = entry.reserved.checked_sub(quantity).ok_or_else(|| {
                        StockError::invalid_state("ledger reserved underflow on sweep")
                    })?;
                    Ok(StockCounts {
                        on_hand: entry.on_hand,
                        reserved,
                    })
                });

            match swapped {
                Ok(_) => {
                    self.publish(StockEvent::StockReleased(StockReleased {
                        reservation_id: claimed.id,
                        sku: claimed.sku.clone(),
                        warehouse_id: claimed.warehouse_id,
                        quantity,
                        expired: true,
                        occurred_at: now,
                    }));
                    released += 1;
                }
                Err(err) => {
                    self.unclaim(claimed.id, ReservationStatus::Expired, ReservationStatus::Pending);
                    warn!(
                        reservation_id = %claimed.id,
                        error = %err,
                        "sweep failed for reservation; left pending for the next sweep"
                    );
                }
            }
        }

        if released > 0 {
            debug!(released, "expired reservations swept");
        }
        Ok(released)
    }

    fn finish_release(&self, reservation: Reservation, expired: bool) -> StockResult<Reservation> {
        debug!(reservation_id = %reservation.id, "reservation released");
        self.publish(StockEvent::StockReleased(StockReleased {
            reservation_id: reservation.id,
            sku: reservation.sku.clone(),
            warehouse_id: reservation.warehouse_id,
            quantity: reservation.quantity,
            expired,
            occurred_at: Utc::now(),
        }));
        Ok(reservation)
    }

    /// Return a claimed transition after a ledger failure, so the hold
    /// keeps counting until it is released or swept.
    fn unclaim(&self, id: ReservationId, claimed: ReservationStatus, prior: ReservationStatus) {
        if self.reservations.transition(id, claimed, prior).is_err() {
            warn!(
                reservation_id = %id,
                claimed = claimed.as_str(),
                prior = prior.as_str(),
                "failed to return reservation status after ledger error"
            );
        }
    }

    /// Bounded optimistic retry loop shared by every ledger mutation.
    ///
    /// `next` computes the target counts from a freshly read row and may
    /// refuse with a business error, which short-circuits the loop.
    /// `VersionConflict` is absorbed here; exhaustion of retries or of the
    /// deadline becomes `Contention`.
    fn swap_with_retry<F>(
        &self,
        sku: &Sku,
        warehouse_id: WarehouseId,
        deadline: Option<Instant>,
        mut next: F,
    ) -> StockResult<StockLedgerEntry>
    where
        F: FnMut(&StockLedgerEntry) -> StockResult<StockCounts>,
    {
        let mut attempts = 0u32;
        loop {
            if let Some(deadline) = deadline {
                if Instant::now() >= deadline {
                    debug!(sku = %sku, attempts, "deadline exhausted under contention");
                    return Err(StockError::Contention);
                }
            }

            let entry = self.ledger.read(sku, warehouse_id)?;
            let counts = next(&entry)?;

            match self
                .ledger
                .compare_and_swap(sku, warehouse_id, entry.version, counts)
            {
                Ok(updated) => return Ok(updated),
                Err(StockError::VersionConflict { expected, found }) => {
                    attempts += 1;
                    debug!(sku = %sku, expected, found, attempts, "version conflict, retrying");
                    if attempts >= self.config.max_retries {
                        warn!(sku = %sku, attempts, "retries exhausted under contention");
                        return Err(StockError::Contention);
                    }
                }
                Err(other) => return Err(other),
            }
        }
    }

    fn publish(&self, event: StockEvent) {
        // State is already durable; a lost publication costs telemetry,
        // not correctness, and consumers tolerate replays.
        if let Err(err) = self.bus.publish(event) {
            warn!(error = ?err, "failed to publish stock event");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use proptest::prelude::*;

    use stockgate_events::{Event, InMemoryEventBus};
    use stockgate_ledger::{InMemoryLedgerStore, StockLedgerEntry};

    use crate::reservation::InMemoryReservationStore;

    use super::*;

    type TestManager = ReservationManager<
        Arc<InMemoryLedgerStore>,
        Arc<InMemoryReservationStore>,
        Arc<InMemoryEventBus<StockEvent>>,
    >;

    struct Fixture {
        manager: Arc<TestManager>,
        ledger: Arc<InMemoryLedgerStore>,
        reservations: Arc<InMemoryReservationStore>,
        bus: Arc<InMemoryEventBus<StockEvent>>,
        sku: Sku,
        warehouse: WarehouseId,
    }

    fn fixture(on_hand: u64) -> Fixture {
        let ledger = Arc::new(InMemoryLedgerStore::new());
        let reservations = Arc::new(InMemoryReservationStore::new());
        let bus = Arc::new(InMemoryEventBus::new());
        let sku = Sku::new("WIDGET-01").unwrap();
        let warehouse = WarehouseId::new();

        ledger
            .put(StockLedgerEntry::new(sku.clone(), warehouse, on_hand))
            .unwrap();

        let manager = Arc::new(ReservationManager::new(
            ledger.clone(),
            reservations.clone(),
            bus.clone(),
        ));

        Fixture {
            manager,
            ledger,
            reservations,
            bus,
            sku,
            warehouse,
        }
    }

    fn ledger_counts(f: &Fixture) -> (u64, u64, u64) {
        let entry = f.ledger.read(&f.sku, f.warehouse).unwrap();
        (entry.on_hand, entry.reserved, entry.version)
    }

    #[test]
    fn reserve_release_reserve_scenario() {
        // Ledger {on_hand: 5, reserved: 0, version: 1}.
        let f = fixture(5);

        let first = f
            .manager
            .reserve(&f.sku, f.warehouse, 3, None, None)
            .unwrap();
        assert_eq!(ledger_counts(&f), (5, 3, 2));

        // Only 2 available now.
        let err = f
            .manager
            .reserve(&f.sku, f.warehouse, 3, None, None)
            .unwrap_err();
        assert_eq!(
            err,
            StockError::InsufficientStock {
                requested: 3,
                available: 2
            }
        );

        f.manager.release(first.id).unwrap();
        assert_eq!(ledger_counts(&f), (5, 0, 3));

        f.manager
            .reserve(&f.sku, f.warehouse, 3, None, None)
            .unwrap();
        assert_eq!(ledger_counts(&f), (5, 3, 4));
    }

    #[test]
    fn two_racing_reserves_for_the_last_unit_produce_one_winner() {
        let f = fixture(1);

        let mut handles = Vec::new();
        for _ in 0..2 {
            let manager = f.manager.clone();
            let sku = f.sku.clone();
            let warehouse = f.warehouse;
            handles.push(std::thread::spawn(move || {
                manager.reserve(&sku, warehouse, 1, None, None)
            }));
        }

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let winners = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(winners, 1);

        let loser = results.into_iter().find(|r| r.is_err()).unwrap().unwrap_err();
        assert_eq!(
            loser,
            StockError::InsufficientStock {
                requested: 1,
                available: 0
            }
        );
    }

    #[test]
    fn concurrent_reserves_never_oversell() {
        let f = fixture(10);

        let mut handles = Vec::new();
        for _ in 0..8 {
            let manager = f.manager.clone();
            let sku = f.sku.clone();
            let warehouse = f.warehouse;
            handles.push(std::thread::spawn(move || {
                let mut won = 0u64;
                loop {
                    match manager.reserve(&sku, warehouse, 1, None, None) {
                        Ok(_) => won += 1,
                        // Contention is caller-retryable; stock may remain.
                        Err(StockError::Contention) => continue,
                        Err(StockError::InsufficientStock { .. }) => break,
                        Err(other) => panic!("unexpected error: {other}"),
                    }
                }
                won
            }));
        }

        let total: u64 = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(total, 10);

        let (on_hand, reserved, _) = ledger_counts(&f);
        assert_eq!(on_hand, 10);
        assert_eq!(reserved, 10);
    }

    #[test]
    fn release_is_idempotent() {
        let f = fixture(5);
        let reservation = f
            .manager
            .reserve(&f.sku, f.warehouse, 2, None, None)
            .unwrap();

        let first = f.manager.release(reservation.id).unwrap();
        let after_first = ledger_counts(&f);

        let second = f.manager.release(reservation.id).unwrap();
        assert_eq!(first.status, ReservationStatus::Released);
        assert_eq!(second.status, ReservationStatus::Released);
        // No double-increment: the ledger did not move again.
        assert_eq!(ledger_counts(&f), after_first);
    }

    #[test]
    fn concurrent_releases_of_one_reservation_decrement_once() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::{Barrier, Mutex};

        // Delegating store that holds the first two readers of one
        // reservation at a barrier, so both observe it Pending before
        // either gets to transition it.
        struct RendezvousStore {
            inner: InMemoryReservationStore,
            target: Mutex<Option<ReservationId>>,
            gate: Barrier,
            passes: AtomicUsize,
        }

        impl ReservationStore for RendezvousStore {
            fn insert(&self, reservation: Reservation) -> StockResult<()> {
                self.inner.insert(reservation)
            }

            fn get(&self, id: ReservationId) -> StockResult<Option<Reservation>> {
                let gated = *self.target.lock().unwrap() == Some(id);
                if gated && self.passes.fetch_add(1, Ordering::SeqCst) < 2 {
                    self.gate.wait();
                }
                self.inner.get(id)
            }

            fn update(&self, reservation: &Reservation) -> StockResult<()> {
                self.inner.update(reservation)
            }

            fn transition(
                &self,
                id: ReservationId,
                expected: ReservationStatus,
                new: ReservationStatus,
            ) -> StockResult<Option<Reservation>> {
                self.inner.transition(id, expected, new)
            }

            fn pending_expired_before(
                &self,
                now: DateTime<Utc>,
            ) -> StockResult<Vec<Reservation>> {
                self.inner.pending_expired_before(now)
            }
        }

        let ledger = Arc::new(InMemoryLedgerStore::new());
        let store = Arc::new(RendezvousStore {
            inner: InMemoryReservationStore::new(),
            target: Mutex::new(None),
            gate: Barrier::new(2),
            passes: AtomicUsize::new(0),
        });
        let bus = Arc::new(InMemoryEventBus::new());
        let sku = Sku::new("WIDGET-01").unwrap();
        let warehouse = WarehouseId::new();
        ledger
            .put(StockLedgerEntry::new(sku.clone(), warehouse, 4))
            .unwrap();
        let manager = Arc::new(ReservationManager::new(
            ledger.clone(),
            store.clone(),
            bus,
        ));

        let first = manager.reserve(&sku, warehouse, 2, None, None).unwrap();
        let second = manager.reserve(&sku, warehouse, 2, None, None).unwrap();
        *store.target.lock().unwrap() = Some(first.id);

        let mut handles = Vec::new();
        for _ in 0..2 {
            let manager = manager.clone();
            let id = first.id;
            handles.push(std::thread::spawn(move || manager.release(id)));
        }
        for h in handles {
            let released = h.join().unwrap().unwrap();
            assert_eq!(released.status, ReservationStatus::Released);
        }

        // Exactly one decrement landed; the second hold keeps its units.
        let entry = ledger.read(&sku, warehouse).unwrap();
        assert_eq!(entry.on_hand, 4);
        assert_eq!(entry.reserved, second.quantity);
    }

    #[test]
    fn confirm_removes_sold_units_from_the_ledger() {
        let f = fixture(5);
        let reservation = f
            .manager
            .reserve(&f.sku, f.warehouse, 3, None, None)
            .unwrap();

        let confirmed = f.manager.confirm(reservation.id).unwrap();
        assert_eq!(confirmed.status, ReservationStatus::Confirmed);
        assert_eq!(ledger_counts(&f), (2, 0, 3));

        // Confirm is terminal.
        let err = f.manager.confirm(reservation.id).unwrap_err();
        assert!(matches!(err, StockError::InvalidState(_)));
    }

    #[test]
    fn releasing_a_confirmed_reservation_returns_stock() {
        let f = fixture(5);
        let reservation = f
            .manager
            .reserve(&f.sku, f.warehouse, 3, None, None)
            .unwrap();
        f.manager.confirm(reservation.id).unwrap();

        let released = f.manager.release(reservation.id).unwrap();
        assert_eq!(released.status, ReservationStatus::Released);
        assert_eq!(ledger_counts(&f), (5, 0, 4));
    }

    #[test]
    fn confirm_of_expired_reservation_is_invalid_state() {
        let f = fixture(5);
        let mut reservation = f
            .manager
            .reserve(&f.sku, f.warehouse, 2, None, None)
            .unwrap();

        reservation.expires_at = Utc::now() - Duration::minutes(1);
        f.reservations.update(&reservation).unwrap();

        let err = f.manager.confirm(reservation.id).unwrap_err();
        assert!(matches!(err, StockError::InvalidState(_)));
    }

    #[test]
    fn sweep_releases_only_expired_pending_reservations() {
        let f = fixture(10);

        let mut expired = f
            .manager
            .reserve(&f.sku, f.warehouse, 2, None, None)
            .unwrap();
        expired.expires_at = Utc::now() - Duration::minutes(1);
        f.reservations.update(&expired).unwrap();

        let live = f
            .manager
            .reserve(&f.sku, f.warehouse, 3, None, None)
            .unwrap();
        let confirmed = f
            .manager
            .reserve(&f.sku, f.warehouse, 1, None, None)
            .unwrap();
        f.manager.confirm(confirmed.id).unwrap();

        let swept = f.manager.sweep_expired(Utc::now()).unwrap();
        assert_eq!(swept, 1);

        let expired = f.reservations.get(expired.id).unwrap().unwrap();
        assert_eq!(expired.status, ReservationStatus::Expired);
        let live = f.reservations.get(live.id).unwrap().unwrap();
        assert_eq!(live.status, ReservationStatus::Pending);

        // 10 on hand - 1 confirmed; only the live hold remains reserved.
        let (on_hand, reserved, _) = ledger_counts(&f);
        assert_eq!(on_hand, 9);
        assert_eq!(reserved, 3);

        // Sweeping again finds nothing.
        assert_eq!(f.manager.sweep_expired(Utc::now()).unwrap(), 0);
    }

    #[test]
    fn reserve_zero_quantity_is_a_validation_error() {
        let f = fixture(5);
        let err = f
            .manager
            .reserve(&f.sku, f.warehouse, 0, None, None)
            .unwrap_err();
        assert!(matches!(err, StockError::Validation(_)));
    }

    #[test]
    fn reserve_unknown_sku_is_not_found() {
        let f = fixture(5);
        let unknown = Sku::new("NO-SUCH-SKU").unwrap();
        let err = f
            .manager
            .reserve(&unknown, f.warehouse, 1, None, None)
            .unwrap_err();
        assert_eq!(err, StockError::NotFound);
    }

    #[test]
    fn expired_deadline_fails_with_contention() {
        let f = fixture(5);
        let deadline = Instant::now() - std::time::Duration::from_millis(1);
        let err = f
            .manager
            .reserve(&f.sku, f.warehouse, 1, None, Some(deadline))
            .unwrap_err();
        assert_eq!(err, StockError::Contention);
    }

    #[test]
    fn lifecycle_publishes_events_in_order() {
        let f = fixture(5);
        let sub = f.bus.subscribe();

        let reservation = f
            .manager
            .reserve(&f.sku, f.warehouse, 2, None, None)
            .unwrap();
        let _ = f.manager.reserve(&f.sku, f.warehouse, 9, None, None);
        f.manager.confirm(reservation.id).unwrap();
        f.manager.release(reservation.id).unwrap();

        let types: Vec<&str> = sub.drain().iter().map(|e| e.event_type()).collect();
        assert_eq!(
            types,
            vec![
                "stock.reserved",
                "stock.reservation_failed",
                "stock.committed",
                "stock.released",
            ]
        );
    }

    proptest! {
        /// Conservation: however many reserve requests land, the ledger
        /// never holds more than it has on hand, and its reserved count
        /// equals the sum of surviving pending holds.
        #[test]
        fn pending_holds_never_exceed_on_hand(
            quantities in prop::collection::vec(1u64..6, 1..30)
        ) {
            let f = fixture(20);
            let mut held = 0u64;

            for quantity in quantities {
                match f.manager.reserve(&f.sku, f.warehouse, quantity, None, None) {
                    Ok(_) => held += quantity,
                    Err(StockError::InsufficientStock { available, .. }) => {
                        prop_assert!(available < quantity);
                    }
                    Err(other) => prop_assert!(false, "unexpected error: {other}"),
                }
            }

            let entry = f.ledger.read(&f.sku, f.warehouse).unwrap();
            prop_assert_eq!(entry.reserved, held);
            prop_assert!(entry.reserved <= entry.on_hand);
        }
    }
}
