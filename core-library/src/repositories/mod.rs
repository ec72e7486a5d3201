//! # Repository Pattern Implementation
//!
//! Repository traits and SQLite implementations for the content cache.
//!
//! ## Architecture
//!
//! - Traits define the read interface for each table and run on the pool
//! - Writes are associated functions on the SQLite implementations that take
//!   the `&mut SqliteConnection` of a [`WriteTransaction`](crate::db::WriteTransaction),
//!   so every mutation runs behind the write gate
//! - All operations return `Result<T>` for error handling
//!
//! ## Available Repositories
//!
//! - `ContentRepository` - Tracks and stories with their local state
//! - `TranslationRepository` - Per-locale names and descriptions
//! - `AudioLocaleRepository` - Per-locale narration assets for stories
//! - `FavouriteLedgerRepository` - LIFO favourite ordering

pub mod audio_locale;
pub mod content;
pub mod favourite;
pub mod translation;

pub use audio_locale::{AudioLocaleRepository, SqliteAudioLocaleRepository};
pub use content::{ContentRepository, SqliteContentRepository};
pub use favourite::{FavouriteLedgerRepository, SqliteFavouriteLedgerRepository};
pub use translation::{SqliteTranslationRepository, TranslationRepository};

use crate::error::Result;
use crate::models::Locale;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use std::collections::BTreeMap;

/// One column name per supported locale, e.g. `text_en, text_ru, ...`
pub(crate) fn locale_columns(prefix: &str) -> Vec<String> {
    Locale::ALL
        .iter()
        .map(|locale| format!("{}_{}", prefix, locale.code()))
        .collect()
}

/// Read the per-locale columns of a row, skipping NULL and blank values.
pub(crate) fn read_locale_columns(
    row: &SqliteRow,
    prefix: &str,
) -> Result<BTreeMap<Locale, String>> {
    let mut values = BTreeMap::new();

    for locale in Locale::ALL {
        let column = format!("{}_{}", prefix, locale.code());
        let value: Option<String> = row.try_get(column.as_str())?;
        if let Some(value) = value.filter(|v| !v.trim().is_empty()) {
            values.insert(locale, value);
        }
    }

    Ok(values)
}

/// `INSERT ... ON CONFLICT DO UPDATE` over the key columns plus every locale column.
pub(crate) fn locale_upsert_sql(table: &str, keys: &[&str], prefix: &str) -> String {
    let columns = locale_columns(prefix);
    let all_columns: Vec<String> = keys
        .iter()
        .map(|key| key.to_string())
        .chain(columns.iter().cloned())
        .collect();
    let placeholders = vec!["?"; all_columns.len()].join(", ");
    let updates = columns
        .iter()
        .map(|column| format!("{column} = excluded.{column}"))
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        "INSERT INTO {table} ({}) VALUES ({placeholders}) ON CONFLICT({}) DO UPDATE SET {updates}",
        all_columns.join(", "),
        keys.join(", "),
    )
}
