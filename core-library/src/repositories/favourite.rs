//! Favourite ordering ledger repository trait and implementation

use crate::error::Result;
use crate::models::{ContentKind, FavouriteLedgerEntry, FavouriteLedgerRow};
use async_trait::async_trait;
use sqlx::{query, query_as, query_scalar, SqliteConnection, SqlitePool};

/// Read access to the favourite ordering ledger
#[async_trait]
pub trait FavouriteLedgerRepository: Send + Sync {
    async fn find(&self, item_id: &str, kind: ContentKind) -> Result<Option<FavouriteLedgerEntry>>;

    /// Entries of a kind, most recent first
    async fn list_by_kind(&self, kind: ContentKind) -> Result<Vec<FavouriteLedgerEntry>>;

    async fn count_by_kind(&self, kind: ContentKind) -> Result<i64>;
}

/// SQLite implementation of FavouriteLedgerRepository
pub struct SqliteFavouriteLedgerRepository {
    pool: SqlitePool,
}

impl SqliteFavouriteLedgerRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn find_in(
        conn: &mut SqliteConnection,
        item_id: &str,
        kind: ContentKind,
    ) -> Result<Option<FavouriteLedgerEntry>> {
        let row = query_as::<_, FavouriteLedgerRow>(
            "SELECT id, item_id, item_kind, favourited_at FROM favourite_ledger \
             WHERE item_id = ? AND item_kind = ?",
        )
        .bind(item_id)
        .bind(kind.as_str())
        .fetch_optional(&mut *conn)
        .await?;

        row.map(FavouriteLedgerEntry::try_from).transpose()
    }

    pub async fn list_in(
        conn: &mut SqliteConnection,
        kind: ContentKind,
    ) -> Result<Vec<FavouriteLedgerEntry>> {
        let rows = query_as::<_, FavouriteLedgerRow>(
            "SELECT id, item_id, item_kind, favourited_at FROM favourite_ledger \
             WHERE item_kind = ? ORDER BY favourited_at DESC, id DESC",
        )
        .bind(kind.as_str())
        .fetch_all(&mut *conn)
        .await?;

        rows.into_iter().map(FavouriteLedgerEntry::try_from).collect()
    }

    /// Insert an entry, replacing any existing one.
    ///
    /// A refreshed entry gets a new id so it sorts after every earlier
    /// insert with the same timestamp.
    pub async fn upsert(
        conn: &mut SqliteConnection,
        item_id: &str,
        kind: ContentKind,
        favourited_at: i64,
    ) -> Result<FavouriteLedgerEntry> {
        Self::delete(&mut *conn, item_id, kind).await?;

        let row = query_as::<_, FavouriteLedgerRow>(
            r#"
            INSERT INTO favourite_ledger (item_id, item_kind, favourited_at)
            VALUES (?, ?, ?)
            RETURNING id, item_id, item_kind, favourited_at
            "#,
        )
        .bind(item_id)
        .bind(kind.as_str())
        .bind(favourited_at)
        .fetch_one(&mut *conn)
        .await?;

        FavouriteLedgerEntry::try_from(row)
    }

    pub async fn delete(conn: &mut SqliteConnection, item_id: &str, kind: ContentKind) -> Result<bool> {
        let result = query("DELETE FROM favourite_ledger WHERE item_id = ? AND item_kind = ?")
            .bind(item_id)
            .bind(kind.as_str())
            .execute(&mut *conn)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl FavouriteLedgerRepository for SqliteFavouriteLedgerRepository {
    async fn find(&self, item_id: &str, kind: ContentKind) -> Result<Option<FavouriteLedgerEntry>> {
        let row = query_as::<_, FavouriteLedgerRow>(
            "SELECT id, item_id, item_kind, favourited_at FROM favourite_ledger \
             WHERE item_id = ? AND item_kind = ?",
        )
        .bind(item_id)
        .bind(kind.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(FavouriteLedgerEntry::try_from).transpose()
    }

    async fn list_by_kind(&self, kind: ContentKind) -> Result<Vec<FavouriteLedgerEntry>> {
        let rows = query_as::<_, FavouriteLedgerRow>(
            "SELECT id, item_id, item_kind, favourited_at FROM favourite_ledger \
             WHERE item_kind = ? ORDER BY favourited_at DESC, id DESC",
        )
        .bind(kind.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(FavouriteLedgerEntry::try_from).collect()
    }

    async fn count_by_kind(&self, kind: ContentKind) -> Result<i64> {
        let count = query_scalar::<_, i64>("SELECT COUNT(*) FROM favourite_ledger WHERE item_kind = ?")
            .bind(kind.as_str())
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}
