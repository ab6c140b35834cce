//! Error taxonomy of the reservation core.

use thiserror::Error;

/// Result type used across the reservation core.
pub type StockResult<T> = Result<T, StockError>;

/// Deterministic domain failure.
///
/// Keep this focused on business/domain outcomes (unknown keys, exhausted
/// stock, stale versions, illegal transitions). Infrastructure concerns
/// (SQLite, HTTP) carry their own error types at their own seams.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StockError {
    /// Unknown SKU/warehouse pair or reservation id. Not retryable.
    #[error("not found")]
    NotFound,

    /// The requested quantity exceeds what is currently available.
    /// Business outcome, not retryable as-is.
    #[error("insufficient stock: requested {requested}, available {available}")]
    InsufficientStock { requested: u64, available: u64 },

    /// A compare-and-swap lost the race against a concurrent writer.
    ///
    /// Internal signal only: the `ReservationManager` absorbs this inside
    /// its retry loop and must never let it reach callers.
    #[error("version conflict: expected {expected}, found {found}")]
    VersionConflict { expected: u64, found: u64 },

    /// Retry budget or caller deadline exhausted under contention.
    /// Retryable by the caller.
    #[error("contention: retries exhausted")]
    Contention,

    /// Illegal lifecycle transition (e.g. confirming a released
    /// reservation). Caller error, not retried.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// A value failed validation (zero quantity, malformed SKU).
    #[error("validation failed: {0}")]
    Validation(String),

    /// An identifier failed to parse.
    #[error("invalid identifier: {0}")]
    InvalidId(String),
}

impl StockError {
    pub fn not_found() -> Self {
        Self::NotFound
    }

    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    /// Whether the caller may usefully retry the same request.
    ///
    /// `VersionConflict` is deliberately not listed: it is retried inside
    /// the manager and should never be observed outside it.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Contention)
    }
}
