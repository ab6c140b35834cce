//! Transport seam between the sync coordinator and the server.
//!
//! The coordinator only cares about one distinction: did the server
//! *reject* the operation (a business decision, never retried) or did
//! delivery *fail* (network trouble, retried with backoff).

use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use serde_json::json;

use stockgate_core::OperationId;
use stockgate_outbox::{OperationKind, OutboxOperation};

/// How an operation failed to apply.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    /// The server understood the operation and said no. Terminal.
    #[error("operation rejected: {0}")]
    Rejected(String),
    /// Delivery failed before the server could decide. Retryable.
    #[error("transient transport failure: {0}")]
    Transient(String),
}

/// Applies one outbox operation against the authoritative server.
#[async_trait]
pub trait SyncTransport: Send + Sync + 'static {
    async fn apply(&self, operation: &OutboxOperation) -> Result<(), TransportError>;
}

/// HTTP transport for the stockgate server API.
///
/// Every request carries the operation's client-generated id as an
/// `Idempotency-Key` header, so a replay of an already-applied operation
/// is acknowledged without a second effect.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
    bearer_token: Option<String>,
}

impl HttpTransport {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            bearer_token: None,
        }
    }

    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }

    fn route(&self, kind: &OperationKind) -> (String, serde_json::Value) {
        let base = self.base_url.trim_end_matches('/');
        match kind {
            OperationKind::CreateOrder { order_id, lines } => (
                format!("{base}/sales/orders"),
                json!({ "order_id": order_id, "lines": lines }),
            ),
            OperationKind::AddPayment {
                order_id,
                amount_cents,
            } => (
                format!("{base}/sales/orders/{order_id}/payments"),
                json!({ "amount_cents": amount_cents }),
            ),
            OperationKind::ReserveStock {
                sku,
                warehouse_id,
                quantity,
            } => (
                format!("{base}/inventory/reservations"),
                json!({ "sku": sku, "warehouse_id": warehouse_id, "quantity": quantity }),
            ),
            OperationKind::CheckInAttendance { employee_id, at } => (
                format!("{base}/hr/attendance/check-ins"),
                json!({ "employee_id": employee_id, "at": at }),
            ),
        }
    }
}

#[async_trait]
impl SyncTransport for HttpTransport {
    async fn apply(&self, operation: &OutboxOperation) -> Result<(), TransportError> {
        let (url, body) = self.route(&operation.kind);

        let mut request = self
            .client
            .post(&url)
            .header("Idempotency-Key", operation.id.to_string())
            .json(&body);
        if let Some(token) = &self.bearer_token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|err| TransportError::Transient(err.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let detail = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("<no body>"));

        // 409/422 mean the server evaluated the operation and refused it;
        // anything else is delivery trouble worth retrying.
        if status == reqwest::StatusCode::CONFLICT
            || status == reqwest::StatusCode::UNPROCESSABLE_ENTITY
        {
            Err(TransportError::Rejected(format!("{status}: {detail}")))
        } else {
            Err(TransportError::Transient(format!("{status}: {detail}")))
        }
    }
}

/// In-memory transport for tests: scriptable failures, idempotent by
/// operation id like the real server.
#[derive(Debug, Default)]
pub struct InMemoryTransport {
    inner: Mutex<TransportState>,
}

#[derive(Debug, Default)]
struct TransportState {
    applied: Vec<OutboxOperation>,
    seen: HashSet<OperationId>,
    rejections: HashMap<OperationId, String>,
    transient_failures: HashMap<OperationId, u32>,
    fail_after_apply: HashSet<OperationId>,
}

impl InMemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    // Recover from poisoning instead of panicking; the state stays
    // consistent because every mutation below is a single insert.
    fn state(&self) -> MutexGuard<'_, TransportState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Script a business rejection for `id`.
    pub fn reject_operation(&self, id: OperationId, reason: impl Into<String>) {
        self.state().rejections.insert(id, reason.into());
    }

    /// Script the next `times` deliveries of `id` to fail transiently.
    pub fn fail_transient_times(&self, id: OperationId, times: u32) {
        self.state().transient_failures.insert(id, times);
    }

    /// Script a lost acknowledgement: the first delivery of `id` applies
    /// server-side but the response never arrives.
    pub fn fail_after_apply(&self, id: OperationId) {
        self.state().fail_after_apply.insert(id);
    }

    /// Operations actually applied, in arrival order.
    pub fn applied(&self) -> Vec<OutboxOperation> {
        self.state().applied.clone()
    }
}

#[async_trait]
impl SyncTransport for InMemoryTransport {
    async fn apply(&self, operation: &OutboxOperation) -> Result<(), TransportError> {
        let mut state = self.state();

        if let Some(reason) = state.rejections.get(&operation.id) {
            return Err(TransportError::Rejected(reason.clone()));
        }

        if let Some(remaining) = state.transient_failures.get_mut(&operation.id) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(TransportError::Transient(String::from(
                    "connection reset by peer",
                )));
            }
        }

        // Replays of an already-applied id are acknowledged with no
        // second effect.
        if state.seen.insert(operation.id) {
            state.applied.push(operation.clone());
            if state.fail_after_apply.remove(&operation.id) {
                return Err(TransportError::Transient(String::from(
                    "response timed out after apply",
                )));
            }
        }

        Ok(())
    }
}
