//! Reservation records: the audit trail of holds against stock.
//!
//! The ledger is the source of truth for aggregate counts; a
//! `Reservation` is the per-order-line record of one hold and its
//! lifecycle.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockgate_core::{ReservationId, Sku, StockError, StockResult, WarehouseId};

/// Lifecycle state of a reservation.
///
/// ```text
/// Pending ──confirm──▶ Confirmed ──release──▶ Released
///    │                                           ▲
///    ├──────────────── release ──────────────────┤
///    └──────────────── sweep ───▶ Expired
/// ```
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReservationStatus {
    Pending,
    Confirmed,
    Released,
    Expired,
}

impl ReservationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationStatus::Pending => "Pending",
            ReservationStatus::Confirmed => "Confirmed",
            ReservationStatus::Released => "Released",
            ReservationStatus::Expired => "Expired",
        }
    }

    /// Released and Expired hold no stock and accept no transitions
    /// other than the idempotent release no-op.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ReservationStatus::Released | ReservationStatus::Expired)
    }
}

/// A hold of `quantity` units of one SKU at one warehouse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: ReservationId,
    pub sku: Sku,
    pub warehouse_id: WarehouseId,
    pub quantity: u64,
    pub status: ReservationStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Reservation {
    pub fn new(
        id: ReservationId,
        sku: Sku,
        warehouse_id: WarehouseId,
        quantity: u64,
        created_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            sku,
            warehouse_id,
            quantity,
            status: ReservationStatus::Pending,
            created_at,
            expires_at,
        }
    }

    /// A Pending reservation past its expiry no longer guarantees the
    /// hold; it is waiting for the sweep to return its units.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.status == ReservationStatus::Pending && self.expires_at <= now
    }
}

/// Persistence seam for reservation records.
pub trait ReservationStore: Send + Sync {
    /// Insert a new record; the id must not already exist.
    fn insert(&self, reservation: Reservation) -> StockResult<()>;

    fn get(&self, id: ReservationId) -> StockResult<Option<Reservation>>;

    /// Replace an existing record; `NotFound` if the id is unknown.
    fn update(&self, reservation: &Reservation) -> StockResult<()>;

    /// Set the status to `new` only if it currently equals `expected`.
    ///
    /// The status analogue of the ledger's compare-and-swap: of any number
    /// of concurrent claimants, exactly one receives the updated record;
    /// the rest get `None` and must re-read. `NotFound` for unknown ids.
    fn transition(
        &self,
        id: ReservationId,
        expected: ReservationStatus,
        new: ReservationStatus,
    ) -> StockResult<Option<Reservation>>;

    /// Pending reservations whose expiry is at or before `now`, the
    /// sweep's work list.
    fn pending_expired_before(&self, now: DateTime<Utc>) -> StockResult<Vec<Reservation>>;
}

impl<S> ReservationStore for Arc<S>
where
    S: ReservationStore + ?Sized,
{
    fn insert(&self, reservation: Reservation) -> StockResult<()> {
        (**self).insert(reservation)
    }

    fn get(&self, id: ReservationId) -> StockResult<Option<Reservation>> {
        (**self).get(id)
    }

    fn update(&self, reservation: &Reservation) -> StockResult<()> {
        (**self).update(reservation)
    }

    fn transition(
        &self,
        id: ReservationId,
        expected: ReservationStatus,
        new: ReservationStatus,
    ) -> StockResult<Option<Reservation>> {
        (**self).transition(id, expected, new)
    }

    fn pending_expired_before(&self, now: DateTime<Utc>) -> StockResult<Vec<Reservation>> {
        (**self).pending_expired_before(now)
    }
}

/// In-memory reservation store for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryReservationStore {
    rows: RwLock<HashMap<ReservationId, Reservation>>,
}

impl InMemoryReservationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ReservationStore for InMemoryReservationStore {
    fn insert(&self, reservation: Reservation) -> StockResult<()> {
        let mut rows = self
            .rows
            .write()
            .map_err(|_| StockError::invalid_state("reservation lock poisoned"))?;

        if rows.contains_key(&reservation.id) {
            return Err(StockError::invalid_state(format!(
                "reservation {} already exists",
                reservation.id
            )));
        }
        rows.insert(reservation.id, reservation);
        Ok(())
    }

    fn get(&self, id: ReservationId) -> StockResult<Option<Reservation>> {
        let rows = self
            .rows
            .read()
            .map_err(|_| StockError::invalid_state("reservation lock poisoned"))?;
        Ok(rows.get(&id).cloned())
    }

    fn update(&self, reservation: &Reservation) -> StockResult<()> {
        let mut rows = self
            .rows
            .write()
            .map_err(|_| StockError::invalid_state("reservation lock poisoned"))?;

        match rows.get_mut(&reservation.id) {
            Some(row) => {
                *row = reservation.clone();
                Ok(())
            }
            None => Err(StockError::NotFound),
        }
    }

    fn transition(
        &self,
        id: ReservationId,
        expected: ReservationStatus,
        new: ReservationStatus,
    ) -> StockResult<Option<Reservation>> {
        let mut rows = self
            .rows
            .write()
            .map_err(|_| StockError::invalid_state("reservation lock poisoned"))?;

        let row = rows.get_mut(&id).ok_or(StockError::NotFound)?;
        if row.status != expected {
            return Ok(None);
        }
        row.status = new;
        Ok(Some(row.clone()))
    }

    fn pending_expired_before(&self, now: DateTime<Utc>) -> StockResult<Vec<Reservation>> {
        let rows = self
            .rows
            .read()
            .map_err(|_| StockError::invalid_state("reservation lock poisoned"))?;

        let mut expired: Vec<Reservation> =
            rows.values().filter(|r| r.is_expired(now)).cloned().collect();
        // Oldest expiry first so the sweep returns stock in a stable order.
        expired.sort_by_key(|r| (r.expires_at, *r.id.as_uuid()));
        Ok(expired)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn reservation(status: ReservationStatus, expires_at: DateTime<Utc>) -> Reservation {
        let mut r = Reservation::new(
            ReservationId::new(),
            Sku::new("WIDGET-01").unwrap(),
            WarehouseId::new(),
            2,
            Utc::now(),
            expires_at,
        );
        r.status = status;
        r
    }

    #[test]
    fn insert_rejects_duplicate_ids() {
        let store = InMemoryReservationStore::new();
        let r = reservation(ReservationStatus::Pending, Utc::now());
        store.insert(r.clone()).unwrap();
        assert!(matches!(
            store.insert(r),
            Err(StockError::InvalidState(_))
        ));
    }

    #[test]
    fn update_unknown_id_is_not_found() {
        let store = InMemoryReservationStore::new();
        let r = reservation(ReservationStatus::Pending, Utc::now());
        assert_eq!(store.update(&r).unwrap_err(), StockError::NotFound);
    }

    #[test]
    fn pending_expired_before_skips_confirmed_and_future() {
        let store = InMemoryReservationStore::new();
        let now = Utc::now();

        let past_pending = reservation(ReservationStatus::Pending, now - Duration::minutes(1));
        let past_confirmed = reservation(ReservationStatus::Confirmed, now - Duration::minutes(1));
        let future_pending = reservation(ReservationStatus::Pending, now + Duration::minutes(10));

        store.insert(past_pending.clone()).unwrap();
        store.insert(past_confirmed).unwrap();
        store.insert(future_pending).unwrap();

        let expired = store.pending_expired_before(now).unwrap();
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].id, past_pending.id);
    }

    #[test]
    fn transition_claims_the_status_exactly_once() {
        let store = InMemoryReservationStore::new();
        let r = reservation(ReservationStatus::Pending, Utc::now());
        store.insert(r.clone()).unwrap();

        let claimed = store
            .transition(r.id, ReservationStatus::Pending, ReservationStatus::Released)
            .unwrap();
        assert_eq!(claimed.unwrap().status, ReservationStatus::Released);

        // A second claimant finds the status already moved on.
        let lost = store
            .transition(r.id, ReservationStatus::Pending, ReservationStatus::Expired)
            .unwrap();
        assert!(lost.is_none());

        let err = store
            .transition(
                ReservationId::new(),
                ReservationStatus::Pending,
                ReservationStatus::Released,
            )
            .unwrap_err();
        assert_eq!(err, StockError::NotFound);
    }

    #[test]
    fn terminal_statuses() {
        assert!(ReservationStatus::Released.is_terminal());
        assert!(ReservationStatus::Expired.is_terminal());
        assert!(!ReservationStatus::Pending.is_terminal());
        assert!(!ReservationStatus::Confirmed.is_terminal());
    }
}
