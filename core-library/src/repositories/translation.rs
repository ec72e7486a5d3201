//! Translation repository trait and implementation

use crate::error::{LibraryError, Result};
use crate::models::{ContentKind, TranslationField, TranslationRecord};
use crate::repositories::{locale_columns, locale_upsert_sql, read_locale_columns};
use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{query, Row, SqliteConnection, SqlitePool};

/// Read access to per-locale names and descriptions
#[async_trait]
pub trait TranslationRepository: Send + Sync {
    /// Find the translation of one field of one item
    async fn find(
        &self,
        document_id: &str,
        field: TranslationField,
    ) -> Result<Option<TranslationRecord>>;

    /// All translated fields of one item
    async fn find_for_item(&self, document_id: &str) -> Result<Vec<TranslationRecord>>;

    /// All translations belonging to items of a kind
    async fn list_by_kind(&self, kind: ContentKind) -> Result<Vec<TranslationRecord>>;
}

/// SQLite implementation of TranslationRepository
pub struct SqliteTranslationRepository {
    pool: SqlitePool,
}

impl SqliteTranslationRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn select_columns(alias: &str) -> String {
        std::iter::once(format!("{alias}.document_id"))
            .chain(std::iter::once(format!("{alias}.field")))
            .chain(
                locale_columns("text")
                    .into_iter()
                    .map(|column| format!("{alias}.{column}")),
            )
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn list_by_kind_sql() -> String {
        format!(
            "SELECT {} FROM content_translations t \
             INNER JOIN content_items c ON c.document_id = t.document_id \
             WHERE c.kind = ? ORDER BY t.document_id, t.field",
            Self::select_columns("t")
        )
    }

    fn record_from_row(row: &SqliteRow) -> Result<TranslationRecord> {
        let document_id: String = row.try_get("document_id")?;
        let field_tag: String = row.try_get("field")?;
        let field = TranslationField::parse(&field_tag).ok_or_else(|| LibraryError::InvalidInput {
            field: "field".to_string(),
            message: format!("unknown translation field '{}'", field_tag),
        })?;

        Ok(TranslationRecord {
            document_id,
            field,
            texts: read_locale_columns(row, "text")?,
        })
    }

    // -------------------------------------------------------------------------
    // Transactional operations
    // -------------------------------------------------------------------------

    pub async fn find_in(
        conn: &mut SqliteConnection,
        document_id: &str,
        field: TranslationField,
    ) -> Result<Option<TranslationRecord>> {
        let sql = format!(
            "SELECT {} FROM content_translations t WHERE t.document_id = ? AND t.field = ?",
            Self::select_columns("t")
        );
        let row = query(&sql)
            .bind(document_id)
            .bind(field.as_str())
            .fetch_optional(&mut *conn)
            .await?;

        row.as_ref().map(Self::record_from_row).transpose()
    }

    pub async fn list_in(
        conn: &mut SqliteConnection,
        kind: ContentKind,
    ) -> Result<Vec<TranslationRecord>> {
        let rows = query(&Self::list_by_kind_sql())
            .bind(kind.as_str())
            .fetch_all(&mut *conn)
            .await?;

        rows.iter().map(Self::record_from_row).collect()
    }

    /// Replace every locale column of `(document_id, field)`
    pub async fn upsert(conn: &mut SqliteConnection, record: &TranslationRecord) -> Result<()> {
        let sql = locale_upsert_sql("content_translations", &["document_id", "field"], "text");
        let mut statement = query(&sql)
            .bind(&record.document_id)
            .bind(record.field.as_str());

        for locale in crate::models::Locale::ALL {
            statement = statement.bind(record.text(locale).map(str::to_string));
        }

        statement.execute(&mut *conn).await?;
        Ok(())
    }

    pub async fn delete(
        conn: &mut SqliteConnection,
        document_id: &str,
        field: TranslationField,
    ) -> Result<bool> {
        let result = query("DELETE FROM content_translations WHERE document_id = ? AND field = ?")
            .bind(document_id)
            .bind(field.as_str())
            .execute(&mut *conn)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl TranslationRepository for SqliteTranslationRepository {
    async fn find(
        &self,
        document_id: &str,
        field: TranslationField,
    ) -> Result<Option<TranslationRecord>> {
        let mut conn = self.pool.acquire().await?;
        Self::find_in(&mut conn, document_id, field).await
    }

    async fn find_for_item(&self, document_id: &str) -> Result<Vec<TranslationRecord>> {
        let sql = format!(
            "SELECT {} FROM content_translations t WHERE t.document_id = ? ORDER BY t.field",
            Self::select_columns("t")
        );
        let rows = query(&sql).bind(document_id).fetch_all(&self.pool).await?;

        rows.iter().map(Self::record_from_row).collect()
    }

    async fn list_by_kind(&self, kind: ContentKind) -> Result<Vec<TranslationRecord>> {
        let rows = query(&Self::list_by_kind_sql())
            .bind(kind.as_str())
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(Self::record_from_row).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::LibraryDatabase;
    use crate::models::Locale;
    use crate::test_support::{insert_items, sample_item};

    fn name_record(document_id: &str) -> TranslationRecord {
        TranslationRecord::new(
            document_id,
            TranslationField::Name,
            [
                (Locale::En, "Moonlight".to_string()),
                (Locale::De, "Mondlicht".to_string()),
            ],
        )
    }

    #[tokio::test]
    async fn test_upsert_and_find() {
        let db = LibraryDatabase::open_in_memory().await.unwrap();
        insert_items(&db, &[sample_item("doc-1", ContentKind::Track, 1)]).await;

        let mut tx = db.begin_write().await.unwrap();
        SqliteTranslationRepository::upsert(tx.conn(), &name_record("doc-1"))
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let repo = SqliteTranslationRepository::new(db.pool().clone());
        let found = repo
            .find("doc-1", TranslationField::Name)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found, name_record("doc-1"));
        assert!(repo
            .find("doc-1", TranslationField::Description)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_upsert_replaces_all_locales() {
        let db = LibraryDatabase::open_in_memory().await.unwrap();
        insert_items(&db, &[sample_item("doc-1", ContentKind::Track, 1)]).await;

        let replacement = TranslationRecord::new(
            "doc-1",
            TranslationField::Name,
            [(Locale::Fr, "Clair de lune".to_string())],
        );

        let mut tx = db.begin_write().await.unwrap();
        SqliteTranslationRepository::upsert(tx.conn(), &name_record("doc-1"))
            .await
            .unwrap();
        SqliteTranslationRepository::upsert(tx.conn(), &replacement)
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let repo = SqliteTranslationRepository::new(db.pool().clone());
        let found = repo.find_for_item("doc-1").await.unwrap();
        assert_eq!(found, vec![replacement]);
    }

    #[tokio::test]
    async fn test_blank_text_reads_as_missing() {
        let db = LibraryDatabase::open_in_memory().await.unwrap();
        insert_items(&db, &[sample_item("doc-1", ContentKind::Track, 1)]).await;

        sqlx::query(
            "INSERT INTO content_translations (document_id, field, text_en, text_ru) \
             VALUES ('doc-1', 'name', 'Moonlight', '  ')",
        )
        .execute(db.pool())
        .await
        .unwrap();

        let repo = SqliteTranslationRepository::new(db.pool().clone());
        let found = repo
            .find("doc-1", TranslationField::Name)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.text(Locale::Ru), None);
        assert_eq!(found.text(Locale::En), Some("Moonlight"));
    }

    #[tokio::test]
    async fn test_list_by_kind_and_delete() {
        let db = LibraryDatabase::open_in_memory().await.unwrap();
        insert_items(
            &db,
            &[
                sample_item("doc-1", ContentKind::Track, 1),
                sample_item("doc-2", ContentKind::Story, 1),
            ],
        )
        .await;

        let mut tx = db.begin_write().await.unwrap();
        SqliteTranslationRepository::upsert(tx.conn(), &name_record("doc-1"))
            .await
            .unwrap();
        SqliteTranslationRepository::upsert(tx.conn(), &name_record("doc-2"))
            .await
            .unwrap();
        let tracks = SqliteTranslationRepository::list_in(tx.conn(), ContentKind::Track)
            .await
            .unwrap();
        assert_eq!(tracks.len(), 1);

        assert!(
            SqliteTranslationRepository::delete(tx.conn(), "doc-1", TranslationField::Name)
                .await
                .unwrap()
        );
        tx.commit().await.unwrap();

        let repo = SqliteTranslationRepository::new(db.pool().clone());
        assert!(repo.list_by_kind(ContentKind::Track).await.unwrap().is_empty());
        assert_eq!(repo.list_by_kind(ContentKind::Story).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_translation_requires_existing_item() {
        let db = LibraryDatabase::open_in_memory().await.unwrap();

        let mut tx = db.begin_write().await.unwrap();
        let result = SqliteTranslationRepository::upsert(tx.conn(), &name_record("missing")).await;
        assert!(matches!(result, Err(LibraryError::Database(_))));
    }
}
