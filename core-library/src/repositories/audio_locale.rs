//! Audio-locale variant repository trait and implementation

use crate::error::Result;
use crate::models::{AudioLocaleVariant, ContentKind, Locale};
use crate::repositories::{locale_columns, locale_upsert_sql, read_locale_columns};
use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{query, Row, SqliteConnection, SqlitePool};

/// Read access to localized narration assets
#[async_trait]
pub trait AudioLocaleRepository: Send + Sync {
    async fn find(&self, document_id: &str) -> Result<Option<AudioLocaleVariant>>;

    /// All variants belonging to items of a kind
    async fn list_by_kind(&self, kind: ContentKind) -> Result<Vec<AudioLocaleVariant>>;
}

/// SQLite implementation of AudioLocaleRepository
pub struct SqliteAudioLocaleRepository {
    pool: SqlitePool,
}

impl SqliteAudioLocaleRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn select_columns(alias: &str) -> String {
        std::iter::once(format!("{alias}.document_id"))
            .chain(
                locale_columns("asset")
                    .into_iter()
                    .map(|column| format!("{alias}.{column}")),
            )
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn list_by_kind_sql() -> String {
        format!(
            "SELECT {} FROM audio_locale_variants a \
             INNER JOIN content_items c ON c.document_id = a.document_id \
             WHERE c.kind = ? ORDER BY a.document_id",
            Self::select_columns("a")
        )
    }

    fn variant_from_row(row: &SqliteRow) -> Result<AudioLocaleVariant> {
        Ok(AudioLocaleVariant {
            document_id: row.try_get("document_id")?,
            assets: read_locale_columns(row, "asset")?,
        })
    }

    pub async fn find_in(
        conn: &mut SqliteConnection,
        document_id: &str,
    ) -> Result<Option<AudioLocaleVariant>> {
        let sql = format!(
            "SELECT {} FROM audio_locale_variants a WHERE a.document_id = ?",
            Self::select_columns("a")
        );
        let row = query(&sql)
            .bind(document_id)
            .fetch_optional(&mut *conn)
            .await?;

        row.as_ref().map(Self::variant_from_row).transpose()
    }

    pub async fn list_in(
        conn: &mut SqliteConnection,
        kind: ContentKind,
    ) -> Result<Vec<AudioLocaleVariant>> {
        let rows = query(&Self::list_by_kind_sql())
            .bind(kind.as_str())
            .fetch_all(&mut *conn)
            .await?;

        rows.iter().map(Self::variant_from_row).collect()
    }

    pub async fn upsert(conn: &mut SqliteConnection, variant: &AudioLocaleVariant) -> Result<()> {
        let sql = locale_upsert_sql("audio_locale_variants", &["document_id"], "asset");
        let mut statement = query(&sql).bind(&variant.document_id);

        for locale in Locale::ALL {
            statement = statement.bind(variant.asset(locale).map(str::to_string));
        }

        statement.execute(&mut *conn).await?;
        Ok(())
    }

    pub async fn delete(conn: &mut SqliteConnection, document_id: &str) -> Result<bool> {
        let result = query("DELETE FROM audio_locale_variants WHERE document_id = ?")
            .bind(document_id)
            .execute(&mut *conn)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl AudioLocaleRepository for SqliteAudioLocaleRepository {
    async fn find(&self, document_id: &str) -> Result<Option<AudioLocaleVariant>> {
        let mut conn = self.pool.acquire().await?;
        Self::find_in(&mut conn, document_id).await
    }

    async fn list_by_kind(&self, kind: ContentKind) -> Result<Vec<AudioLocaleVariant>> {
        let rows = query(&Self::list_by_kind_sql())
            .bind(kind.as_str())
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(Self::variant_from_row).collect()
    }
}
