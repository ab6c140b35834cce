//! SQLite-backed outbox persisted on the client device.
//!
//! Rows survive process restarts; the drain replays them in creation
//! order. The store never touches the network — `enqueue` returns as soon
//! as the row is durable.

use std::path::Path;

use anyhow::{Context, bail};
use chrono::{DateTime, Duration, SecondsFormat, SubsecRound, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;

use stockgate_core::OperationId;

use crate::operation::{OperationKind, OutboxOperation, SyncStatus};

/// Durable outbox queue.
///
/// Cheap to clone (shares the underlying pool) and safe to use from
/// concurrent tasks on the owning device.
#[derive(Debug, Clone)]
pub struct OutboxStore {
    pool: SqlitePool,
}

impl OutboxStore {
    /// Open (creating if missing) the outbox database at `path`.
    pub async fn open(path: &Path) -> anyhow::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create outbox directory at {parent:?}"))?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .with_context(|| format!("failed to open outbox database at {path:?}"))?;

        Self::init(pool).await
    }

    /// Open an in-memory outbox (tests/dev; not durable).
    pub async fn open_in_memory() -> anyhow::Result<Self> {
        // One connection: each SQLite :memory: connection is its own
        // database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .context("failed to open in-memory outbox database")?;

        Self::init(pool).await
    }

    async fn init(pool: SqlitePool) -> anyhow::Result<Self> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS outbox (
                id          TEXT PRIMARY KEY,
                op_type     TEXT NOT NULL,
                payload     TEXT NOT NULL,
                status      TEXT NOT NULL,
                attempts    INTEGER NOT NULL DEFAULT 0,
                created_at  TEXT NOT NULL,
                synced_at   TEXT NULL,
                last_error  TEXT NULL
            )
            "#,
        )
        .execute(&pool)
        .await
        .context("failed to create outbox table")?;

        Ok(Self { pool })
    }

    /// Enqueue a new operation under a fresh client-generated id.
    pub async fn enqueue(&self, kind: OperationKind) -> anyhow::Result<OutboxOperation> {
        self.enqueue_with_id(OperationId::new(), kind).await
    }

    /// Enqueue under an explicit id.
    ///
    /// Idempotent: if the id already exists the stored row is returned
    /// unchanged, so a UI retry of the same capture cannot duplicate the
    /// operation.
    pub async fn enqueue_with_id(
        &self,
        id: OperationId,
        kind: OperationKind,
    ) -> anyhow::Result<OutboxOperation> {
        let operation = OutboxOperation {
            id,
            kind,
            // Micros: the stored precision, so the returned row equals a
            // later re-read.
            created_at: Utc::now().trunc_subsecs(6),
            status: SyncStatus::PendingSync,
            attempts: 0,
            last_error: None,
            synced_at: None,
        };

        let payload = serde_json::to_string(&operation.kind)
            .context("failed to serialize operation payload")?;

        // The conflict clause makes concurrent enqueues of one id race
        // safely: exactly one row lands, every caller gets it back.
        let result = sqlx::query(
            r#"
            INSERT INTO outbox (id, op_type, payload, status, attempts, created_at, synced_at, last_error)
            VALUES (?1, ?2, ?3, ?4, 0, ?5, NULL, NULL)
            ON CONFLICT(id) DO NOTHING
            "#,
        )
        .bind(operation.id.to_string())
        .bind(operation.kind.type_name())
        .bind(payload)
        .bind(operation.status.as_str())
        .bind(rfc3339(operation.created_at))
        .execute(&self.pool)
        .await
        .context("failed to insert outbox operation")?;

        if result.rows_affected() == 0 {
            tracing::debug!(operation_id = %id, "operation already enqueued");
            return self
                .get(id)
                .await?
                .context("outbox row vanished during idempotent enqueue");
        }

        tracing::debug!(
            operation_id = %operation.id,
            op_type = operation.kind.type_name(),
            "operation enqueued"
        );
        Ok(operation)
    }

    /// Fetch one operation by id.
    pub async fn get(&self, id: OperationId) -> anyhow::Result<Option<OutboxOperation>> {
        let row = sqlx::query(
            r#"
            SELECT id, payload, status, attempts, created_at, synced_at, last_error
            FROM outbox
            WHERE id = ?1
            "#,
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .context("failed to fetch outbox operation")?;

        row.map(row_to_operation).transpose()
    }

    /// All operations awaiting sync, in creation (FIFO) order.
    ///
    /// Includes `Syncing` rows: a crash mid-drain leaves them behind, and
    /// replay is idempotent by client id, so re-sending is safe.
    pub async fn list_pending(&self) -> anyhow::Result<Vec<OutboxOperation>> {
        let rows = sqlx::query(
            r#"
            SELECT id, payload, status, attempts, created_at, synced_at, last_error
            FROM outbox
            WHERE status IN ('PendingSync', 'Syncing')
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("failed to list pending operations")?;

        rows.into_iter().map(row_to_operation).collect()
    }

    /// Mark an operation as in flight.
    pub async fn mark_syncing(&self, id: OperationId) -> anyhow::Result<()> {
        self.update_status(id, SyncStatus::Syncing, None, None).await
    }

    /// Mark an operation as applied by the server.
    pub async fn mark_synced(&self, id: OperationId) -> anyhow::Result<()> {
        self.update_status(id, SyncStatus::Synced, Some(Utc::now()), None)
            .await
    }

    /// Mark a business-rule rejection; requires a user decision, never
    /// auto-retried.
    pub async fn mark_conflict(&self, id: OperationId, reason: &str) -> anyhow::Result<()> {
        self.update_status(id, SyncStatus::Conflict, None, Some(reason))
            .await
    }

    /// Mark a transient failure that exhausted its retry budget;
    /// increments the attempt count.
    pub async fn mark_failed(&self, id: OperationId, reason: &str) -> anyhow::Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE outbox
            SET status = 'Failed',
                attempts = attempts + 1,
                last_error = ?2
            WHERE id = ?1
            "#,
        )
        .bind(id.to_string())
        .bind(reason)
        .execute(&self.pool)
        .await
        .context("failed to mark operation as failed")?;

        if result.rows_affected() == 0 {
            bail!("unknown outbox operation {id}");
        }
        Ok(())
    }

    /// Manual-intervention path: move a failed operation back to pending.
    ///
    /// A no-op for rows in any other state; an unknown id is an error.
    pub async fn retry_failed(&self, id: OperationId) -> anyhow::Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE outbox
            SET status = 'PendingSync',
                last_error = NULL
            WHERE id = ?1
              AND status = 'Failed'
            "#,
        )
        .bind(id.to_string())
        .execute(&self.pool)
        .await
        .context("failed to retry failed operation")?;

        if result.rows_affected() == 0 && self.get(id).await?.is_none() {
            bail!("unknown outbox operation {id}");
        }
        Ok(())
    }

    /// Garbage-collect synced rows older than the retention window.
    /// Returns the number of rows removed.
    pub async fn clear_synced(&self, retention: Duration) -> anyhow::Result<u64> {
        let cutoff = rfc3339(Utc::now() - retention);

        let result = sqlx::query(
            r#"
            DELETE FROM outbox
            WHERE status = 'Synced'
              AND synced_at IS NOT NULL
              AND synced_at < ?1
            "#,
        )
        .bind(&cutoff)
        .execute(&self.pool)
        .await
        .context("failed to clear synced operations")?;

        Ok(result.rows_affected())
    }

    async fn update_status(
        &self,
        id: OperationId,
        status: SyncStatus,
        synced_at: Option<DateTime<Utc>>,
        last_error: Option<&str>,
    ) -> anyhow::Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE outbox
            SET status = ?2,
                synced_at = ?3,
                last_error = ?4
            WHERE id = ?1
            "#,
        )
        .bind(id.to_string())
        .bind(status.as_str())
        .bind(synced_at.map(rfc3339))
        .bind(last_error)
        .execute(&self.pool)
        .await
        .context("failed to update operation status")?;

        if result.rows_affected() == 0 {
            bail!("unknown outbox operation {id}");
        }
        Ok(())
    }
}

/// Fixed-width RFC 3339 so lexicographic order matches time order.
fn rfc3339(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Map a database row into an `OutboxOperation`.
fn row_to_operation(row: SqliteRow) -> anyhow::Result<OutboxOperation> {
    let id_str: String = row.try_get("id")?;
    let id = id_str
        .parse::<OperationId>()
        .context("invalid UUID in outbox.id")?;

    let payload_str: String = row.try_get("payload")?;
    let kind: OperationKind =
        serde_json::from_str(&payload_str).context("invalid JSON payload in outbox")?;

    let status_str: String = row.try_get("status")?;
    let Some(status) = SyncStatus::parse(&status_str) else {
        bail!("unknown sync status '{status_str}' in outbox");
    };

    let attempts: i64 = row.try_get("attempts")?;

    let created_at_str: String = row.try_get("created_at")?;
    let created_at = DateTime::parse_from_rfc3339(&created_at_str)
        .map(|dt| dt.with_timezone(&Utc))
        .context("invalid created_at in outbox")?;

    let synced_at_str: Option<String> = row.try_get("synced_at")?;
    let synced_at = synced_at_str
        .map(|s| {
            DateTime::parse_from_rfc3339(&s)
                .map(|dt| dt.with_timezone(&Utc))
                .context("invalid synced_at in outbox")
        })
        .transpose()?;

    let last_error: Option<String> = row.try_get("last_error")?;

    Ok(OutboxOperation {
        id,
        kind,
        created_at,
        status,
        attempts: attempts.try_into().unwrap_or(0),
        last_error,
        synced_at,
    })
}
