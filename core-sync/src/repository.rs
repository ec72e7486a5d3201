//! # Sync Run Repository
//!
//! Persists the history of synchronize attempts in `sync_runs`.
//!
//! Reads go through the pool. Runs are written with
//! [`SqliteSyncRunRepository::insert`] on the connection of a gated write
//! transaction so a completed run commits together with its writes.

use crate::{Result, SyncError, SyncRun, SyncRunId, SyncRunStatus};
use async_trait::async_trait;
use bridge_traits::ContentKind;
use sqlx::{FromRow, SqliteConnection, SqlitePool};

// ============================================================================
// Repository Trait
// ============================================================================

/// Repository trait for sync run history
#[async_trait]
pub trait SyncRunRepository: Send + Sync {
    /// Most recent completed run for a kind
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails
    async fn last_successful(&self, kind: ContentKind) -> Result<Option<SyncRun>>;

    /// Runs for a kind, most recent first
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails
    async fn history(&self, kind: ContentKind, limit: u32) -> Result<Vec<SyncRun>>;
}

// ============================================================================
// SQLite Implementation
// ============================================================================

/// SQLite implementation of SyncRunRepository
pub struct SqliteSyncRunRepository {
    pool: SqlitePool,
}

impl SqliteSyncRunRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn insert(conn: &mut SqliteConnection, run: &SyncRun) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO sync_runs (
                id, kind, status, started_at, finished_at,
                inserted, updated, unchanged, orphaned, pruned, error_message
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(run.id.as_str())
        .bind(run.kind.as_str())
        .bind(run.status.as_str())
        .bind(run.started_at)
        .bind(run.finished_at)
        .bind(run.inserted as i64)
        .bind(run.updated as i64)
        .bind(run.unchanged as i64)
        .bind(run.orphaned as i64)
        .bind(run.pruned as i64)
        .bind(&run.error_message)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }
}

const SYNC_RUN_COLUMNS: &str = "id, kind, status, started_at, finished_at, \
     inserted, updated, unchanged, orphaned, pruned, error_message";

/// Database row representation of a sync run
#[derive(Debug, FromRow)]
struct SyncRunRow {
    id: String,
    kind: String,
    status: String,
    started_at: i64,
    finished_at: i64,
    inserted: i64,
    updated: i64,
    unchanged: i64,
    orphaned: i64,
    pruned: i64,
    error_message: Option<String>,
}

impl TryFrom<SyncRunRow> for SyncRun {
    type Error = SyncError;

    fn try_from(row: SyncRunRow) -> Result<Self> {
        let kind = ContentKind::parse(&row.kind).ok_or(SyncError::InvalidKind(row.kind))?;

        Ok(SyncRun {
            id: SyncRunId::from_string(&row.id)?,
            kind,
            status: row.status.parse::<SyncRunStatus>()?,
            started_at: row.started_at,
            finished_at: row.finished_at,
            inserted: row.inserted.max(0) as u64,
            updated: row.updated.max(0) as u64,
            unchanged: row.unchanged.max(0) as u64,
            orphaned: row.orphaned.max(0) as u64,
            pruned: row.pruned.max(0) as u64,
            error_message: row.error_message,
        })
    }
}

#[async_trait]
impl SyncRunRepository for SqliteSyncRunRepository {
    async fn last_successful(&self, kind: ContentKind) -> Result<Option<SyncRun>> {
        let sql = format!(
            "SELECT {SYNC_RUN_COLUMNS} FROM sync_runs \
             WHERE kind = ? AND status = 'completed' \
             ORDER BY finished_at DESC, rowid DESC LIMIT 1"
        );
        let row = sqlx::query_as::<_, SyncRunRow>(&sql)
            .bind(kind.as_str())
            .fetch_optional(&self.pool)
            .await?;

        row.map(SyncRun::try_from).transpose()
    }

    async fn history(&self, kind: ContentKind, limit: u32) -> Result<Vec<SyncRun>> {
        let sql = format!(
            "SELECT {SYNC_RUN_COLUMNS} FROM sync_runs \
             WHERE kind = ? ORDER BY finished_at DESC, rowid DESC LIMIT ?"
        );
        let rows = sqlx::query_as::<_, SyncRunRow>(&sql)
            .bind(kind.as_str())
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(SyncRun::try_from).collect()
    }
}
