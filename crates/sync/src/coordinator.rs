//! Drains the outbox against the server once connectivity returns.
//!
//! Ordering contract: operations sharing an entity key replay strictly in
//! creation order, and a terminal problem (conflict or exhausted retries)
//! parks the rest of that entity's queue untouched. Distinct entities are
//! independent and drain concurrently.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use stockgate_outbox::{OutboxOperation, OutboxStore};

use crate::transport::{SyncTransport, TransportError};

/// Retry policy for transient delivery failures.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Delivery attempts per operation before it is marked `Failed`.
    pub max_attempts: u32,
    /// Delay before the second attempt.
    pub initial_backoff: Duration,
    /// Ceiling on the delay between attempts.
    pub max_backoff: Duration,
    /// Growth factor between attempts.
    pub multiplier: u32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(30),
            multiplier: 2,
        }
    }
}

impl SyncConfig {
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_initial_backoff(mut self, initial_backoff: Duration) -> Self {
        self.initial_backoff = initial_backoff;
        self
    }

    pub fn with_max_backoff(mut self, max_backoff: Duration) -> Self {
        self.max_backoff = max_backoff;
        self
    }

    /// Delay to wait after attempt number `attempt` (1-based) fails.
    fn backoff_delay(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

/// What a drain pass accomplished.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub synced: usize,
    pub conflicts: usize,
    pub failed: usize,
}

impl SyncReport {
    fn absorb(&mut self, other: SyncReport) {
        self.synced += other.synced;
        self.conflicts += other.conflicts;
        self.failed += other.failed;
    }
}

enum Outcome {
    Synced,
    Conflict,
    Failed,
}

/// Replays pending outbox operations through a [`SyncTransport`].
pub struct SyncCoordinator<T> {
    outbox: OutboxStore,
    transport: Arc<T>,
    config: SyncConfig,
}

impl<T: SyncTransport> SyncCoordinator<T> {
    pub fn new(outbox: OutboxStore, transport: Arc<T>) -> Self {
        Self::with_config(outbox, transport, SyncConfig::default())
    }

    pub fn with_config(outbox: OutboxStore, transport: Arc<T>, config: SyncConfig) -> Self {
        Self {
            outbox,
            transport,
            config,
        }
    }

    /// One full drain pass over everything currently pending.
    ///
    /// Entity groups run as separate tasks; within a group, operations
    /// apply one at a time in creation order.
    pub async fn drain(&self) -> anyhow::Result<SyncReport> {
        let pending = self.outbox.list_pending().await?;
        if pending.is_empty() {
            return Ok(SyncReport::default());
        }

        // Bucket by entity key, keeping both intra-group FIFO order and
        // the first-seen order of the groups themselves.
        let mut group_order = Vec::new();
        let mut groups: HashMap<String, Vec<OutboxOperation>> = HashMap::new();
        for operation in pending {
            let key = operation.entity_key();
            groups
                .entry(key.clone())
                .or_insert_with(|| {
                    group_order.push(key.clone());
                    Vec::new()
                })
                .push(operation);
        }

        info!(
            groups = group_order.len(),
            "draining outbox"
        );

        let mut handles = Vec::with_capacity(group_order.len());
        for key in group_order {
            let operations = groups.remove(&key).unwrap_or_default();
            let outbox = self.outbox.clone();
            let transport = Arc::clone(&self.transport);
            let config = self.config.clone();
            handles.push(tokio::spawn(async move {
                drain_group(&key, operations, outbox, transport, config).await
            }));
        }

        let mut report = SyncReport::default();
        for handle in handles {
            report.absorb(handle.await?);
        }

        info!(
            synced = report.synced,
            conflicts = report.conflicts,
            failed = report.failed,
            "outbox drain finished"
        );
        Ok(report)
    }
}

/// Drain one entity's queue sequentially.
///
/// Stops at the first conflict or failure so later operations against the
/// same entity never apply out of order; they stay `PendingSync` for the
/// next pass.
async fn drain_group<T: SyncTransport>(
    key: &str,
    operations: Vec<OutboxOperation>,
    outbox: OutboxStore,
    transport: Arc<T>,
    config: SyncConfig,
) -> SyncReport {
    let mut report = SyncReport::default();

    for operation in operations {
        match sync_one(&operation, &outbox, transport.as_ref(), &config).await {
            Ok(Outcome::Synced) => report.synced += 1,
            Ok(Outcome::Conflict) => {
                report.conflicts += 1;
                warn!(entity_key = key, "conflict; parking the rest of this entity's queue");
                break;
            }
            Ok(Outcome::Failed) => {
                report.failed += 1;
                warn!(entity_key = key, "retries exhausted; parking the rest of this entity's queue");
                break;
            }
            Err(err) => {
                warn!(entity_key = key, error = %err, "outbox update failed mid-drain");
                break;
            }
        }
    }

    report
}

async fn sync_one<T: SyncTransport>(
    operation: &OutboxOperation,
    outbox: &OutboxStore,
    transport: &T,
    config: &SyncConfig,
) -> anyhow::Result<Outcome> {
    outbox.mark_syncing(operation.id).await?;

    let mut attempt = 1;
    loop {
        match transport.apply(operation).await {
            Ok(()) => {
                outbox.mark_synced(operation.id).await?;
                debug!(
                    operation_id = %operation.id,
                    op_type = operation.kind.type_name(),
                    attempts = attempt,
                    "operation synced"
                );
                return Ok(Outcome::Synced);
            }
            Err(TransportError::Rejected(reason)) => {
                outbox.mark_conflict(operation.id, &reason).await?;
                warn!(
                    operation_id = %operation.id,
                    op_type = operation.kind.type_name(),
                    reason,
                    "operation rejected by server"
                );
                return Ok(Outcome::Conflict);
            }
            Err(TransportError::Transient(reason)) => {
                if attempt >= config.max_attempts {
                    outbox.mark_failed(operation.id, &reason).await?;
                    warn!(
                        operation_id = %operation.id,
                        op_type = operation.kind.type_name(),
                        attempts = attempt,
                        reason,
                        "retries exhausted"
                    );
                    return Ok(Outcome::Failed);
                }

                let delay = config.backoff_delay(attempt);
                debug!(
                    operation_id = %operation.id,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    reason,
                    "transient failure; backing off"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
