//! Content item repository trait and implementation

use crate::error::{LibraryError, Result};
use crate::models::{content_columns, ContentItem, ContentItemRow, ContentKind, CONTENT_COLUMNS};
use async_trait::async_trait;
use sqlx::{query, query_as, query_scalar, SqliteConnection, SqlitePool};

/// Read access to cached content items
#[async_trait]
pub trait ContentRepository: Send + Sync {
    /// Find an item by its document id, whatever its kind
    async fn find_by_id(&self, document_id: &str) -> Result<Option<ContentItem>>;

    /// Find an item matching both id and kind
    async fn find_by_id_and_kind(
        &self,
        document_id: &str,
        kind: ContentKind,
    ) -> Result<Option<ContentItem>>;

    /// All items of a kind in `local_id` order
    async fn list_by_kind(&self, kind: ContentKind) -> Result<Vec<ContentItem>>;

    /// Favourite items of a kind, most recently favourited first.
    ///
    /// Only items that are flagged *and* have a ledger entry are returned.
    async fn list_favourites(&self, kind: ContentKind) -> Result<Vec<ContentItem>>;

    /// Count items of a kind
    async fn count_by_kind(&self, kind: ContentKind) -> Result<i64>;
}

/// SQLite implementation of ContentRepository
pub struct SqliteContentRepository {
    pool: SqlitePool,
}

impl SqliteContentRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn rows_to_items(rows: Vec<ContentItemRow>) -> Result<Vec<ContentItem>> {
        rows.into_iter().map(ContentItem::try_from).collect()
    }

    fn favourites_sql() -> String {
        format!(
            "SELECT {} FROM content_items c \
             INNER JOIN favourite_ledger f ON f.item_id = c.document_id AND f.item_kind = c.kind \
             WHERE c.kind = ? AND c.is_favourite = 1 \
             ORDER BY f.favourited_at DESC, f.id DESC",
            content_columns("c")
        )
    }

    // -------------------------------------------------------------------------
    // Transactional operations
    // -------------------------------------------------------------------------

    pub async fn find_in(
        conn: &mut SqliteConnection,
        document_id: &str,
    ) -> Result<Option<ContentItem>> {
        let sql = format!("SELECT {CONTENT_COLUMNS} FROM content_items WHERE document_id = ?");
        let row = query_as::<_, ContentItemRow>(&sql)
            .bind(document_id)
            .fetch_optional(&mut *conn)
            .await?;

        row.map(ContentItem::try_from).transpose()
    }

    pub async fn find_in_by_kind(
        conn: &mut SqliteConnection,
        document_id: &str,
        kind: ContentKind,
    ) -> Result<Option<ContentItem>> {
        let sql = format!(
            "SELECT {CONTENT_COLUMNS} FROM content_items WHERE document_id = ? AND kind = ?"
        );
        let row = query_as::<_, ContentItemRow>(&sql)
            .bind(document_id)
            .bind(kind.as_str())
            .fetch_optional(&mut *conn)
            .await?;

        row.map(ContentItem::try_from).transpose()
    }

    pub async fn list_in(conn: &mut SqliteConnection, kind: ContentKind) -> Result<Vec<ContentItem>> {
        let sql = format!(
            "SELECT {CONTENT_COLUMNS} FROM content_items WHERE kind = ? ORDER BY local_id, document_id"
        );
        let rows = query_as::<_, ContentItemRow>(&sql)
            .bind(kind.as_str())
            .fetch_all(&mut *conn)
            .await?;

        Self::rows_to_items(rows)
    }

    /// Insert a new item or overwrite the remote-sourced fields of an existing one.
    ///
    /// Locally owned fields are only written on insert.
    pub async fn upsert(conn: &mut SqliteConnection, item: &ContentItem) -> Result<()> {
        item.validate().map_err(|msg| LibraryError::InvalidInput {
            field: "content_item".to_string(),
            message: msg,
        })?;

        query(
            r#"
            INSERT INTO content_items (
                document_id, kind, local_id, display_name_fallback, asset_path, image_path,
                size_or_duration, popularity_count, is_free, created_at,
                is_downloaded, local_asset_path, is_favourite
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(document_id) DO UPDATE SET
                kind = excluded.kind,
                local_id = excluded.local_id,
                display_name_fallback = excluded.display_name_fallback,
                asset_path = excluded.asset_path,
                image_path = excluded.image_path,
                size_or_duration = excluded.size_or_duration,
                popularity_count = excluded.popularity_count,
                is_free = excluded.is_free,
                created_at = excluded.created_at
            "#,
        )
        .bind(&item.document_id)
        .bind(item.kind.as_str())
        .bind(item.local_id)
        .bind(&item.display_name_fallback)
        .bind(&item.asset_path)
        .bind(&item.image_path)
        .bind(&item.size_or_duration)
        .bind(item.popularity_count)
        .bind(item.is_free)
        .bind(item.created_at)
        .bind(item.is_downloaded)
        .bind(&item.local_asset_path)
        .bind(item.is_favourite)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    /// Returns false when no row matches both id and kind.
    pub async fn set_favourite(
        conn: &mut SqliteConnection,
        document_id: &str,
        kind: ContentKind,
        is_favourite: bool,
    ) -> Result<bool> {
        let result = query(
            "UPDATE content_items SET is_favourite = ? WHERE document_id = ? AND kind = ?",
        )
        .bind(is_favourite)
        .bind(document_id)
        .bind(kind.as_str())
        .execute(&mut *conn)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn mark_downloaded(
        conn: &mut SqliteConnection,
        document_id: &str,
        local_asset_path: &str,
    ) -> Result<bool> {
        let result = query(
            "UPDATE content_items SET is_downloaded = 1, local_asset_path = ? WHERE document_id = ?",
        )
        .bind(local_asset_path)
        .bind(document_id)
        .execute(&mut *conn)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn clear_download(conn: &mut SqliteConnection, document_id: &str) -> Result<bool> {
        let result = query(
            "UPDATE content_items SET is_downloaded = 0, local_asset_path = NULL WHERE document_id = ?",
        )
        .bind(document_id)
        .execute(&mut *conn)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Delete items; translations, audio variants and ledger rows cascade.
    pub async fn delete_many(conn: &mut SqliteConnection, document_ids: &[String]) -> Result<u64> {
        let mut deleted = 0;
        for document_id in document_ids {
            let result = query("DELETE FROM content_items WHERE document_id = ?")
                .bind(document_id)
                .execute(&mut *conn)
                .await?;
            deleted += result.rows_affected();
        }
        Ok(deleted)
    }
}

#[async_trait]
impl ContentRepository for SqliteContentRepository {
    async fn find_by_id(&self, document_id: &str) -> Result<Option<ContentItem>> {
        let sql = format!("SELECT {CONTENT_COLUMNS} FROM content_items WHERE document_id = ?");
        let row = query_as::<_, ContentItemRow>(&sql)
            .bind(document_id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(ContentItem::try_from).transpose()
    }

    async fn find_by_id_and_kind(
        &self,
        document_id: &str,
        kind: ContentKind,
    ) -> Result<Option<ContentItem>> {
        let sql = format!(
            "SELECT {CONTENT_COLUMNS} FROM content_items WHERE document_id = ? AND kind = ?"
        );
        let row = query_as::<_, ContentItemRow>(&sql)
            .bind(document_id)
            .bind(kind.as_str())
            .fetch_optional(&self.pool)
            .await?;

        row.map(ContentItem::try_from).transpose()
    }

    async fn list_by_kind(&self, kind: ContentKind) -> Result<Vec<ContentItem>> {
        let sql = format!(
            "SELECT {CONTENT_COLUMNS} FROM content_items WHERE kind = ? ORDER BY local_id, document_id"
        );
        let rows = query_as::<_, ContentItemRow>(&sql)
            .bind(kind.as_str())
            .fetch_all(&self.pool)
            .await?;

        Self::rows_to_items(rows)
    }

    async fn list_favourites(&self, kind: ContentKind) -> Result<Vec<ContentItem>> {
        let rows = query_as::<_, ContentItemRow>(&Self::favourites_sql())
            .bind(kind.as_str())
            .fetch_all(&self.pool)
            .await?;

        Self::rows_to_items(rows)
    }

    async fn count_by_kind(&self, kind: ContentKind) -> Result<i64> {
        let count = query_scalar::<_, i64>("SELECT COUNT(*) FROM content_items WHERE kind = ?")
            .bind(kind.as_str())
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}
