//! Domain models for the content cache
//!
//! This module contains the cached entities, their database row mappings and
//! the view models produced by the query façade.

use bridge_traits::remote::RemoteContentItem;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::collections::BTreeMap;

use crate::error::LibraryError;

pub use bridge_traits::remote::{ContentKind, Locale, TranslationField};

// =============================================================================
// Content Items
// =============================================================================

/// Canonical cached row for a track or a story
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentItem {
    /// Remote-assigned primary key, join key for every child table
    pub document_id: String,
    pub kind: ContentKind,
    /// Cross-reference key used by remote translation/audio rows
    pub local_id: i64,

    // Remote-sourced
    pub display_name_fallback: String,
    pub asset_path: String,
    pub image_path: String,
    pub size_or_duration: String,
    pub popularity_count: i64,
    pub is_free: bool,
    /// Epoch milliseconds
    pub created_at: i64,

    // Locally owned
    pub is_downloaded: bool,
    pub local_asset_path: Option<String>,
    pub is_favourite: bool,
}

impl ContentItem {
    /// New row for a remote item that was never cached.
    pub fn from_remote(remote: &RemoteContentItem) -> Self {
        Self {
            document_id: remote.document_id.clone(),
            kind: remote.kind,
            local_id: remote.local_id,
            display_name_fallback: remote.display_name_fallback.clone(),
            asset_path: remote.asset_path.clone(),
            image_path: remote.image_path.clone(),
            size_or_duration: remote.size_or_duration.clone(),
            popularity_count: remote.popularity_count.max(0),
            is_free: remote.is_free,
            created_at: remote.created_at,
            is_downloaded: false,
            local_asset_path: None,
            is_favourite: false,
        }
    }

    /// Replace every remote-sourced field, keeping locally owned state verbatim.
    pub fn merged_with_remote(&self, remote: &RemoteContentItem) -> Self {
        Self {
            is_downloaded: self.is_downloaded,
            local_asset_path: self.local_asset_path.clone(),
            is_favourite: self.is_favourite,
            ..Self::from_remote(remote)
        }
    }

    /// Whether the remote-sourced fields of both rows match.
    pub fn has_same_remote_fields(&self, other: &ContentItem) -> bool {
        self.document_id == other.document_id
            && self.kind == other.kind
            && self.local_id == other.local_id
            && self.display_name_fallback == other.display_name_fallback
            && self.asset_path == other.asset_path
            && self.image_path == other.image_path
            && self.size_or_duration == other.size_or_duration
            && self.popularity_count == other.popularity_count
            && self.is_free == other.is_free
            && self.created_at == other.created_at
    }

    /// Validate row invariants before writing.
    pub fn validate(&self) -> Result<(), String> {
        if self.document_id.trim().is_empty() {
            return Err("document_id cannot be empty".to_string());
        }

        if self.popularity_count < 0 {
            return Err(format!(
                "popularity_count must be >= 0, got {}",
                self.popularity_count
            ));
        }

        if self.is_downloaded && self.local_asset_path.is_none() {
            return Err("is_downloaded requires local_asset_path".to_string());
        }

        Ok(())
    }
}

pub(crate) const CONTENT_COLUMNS: &str = "document_id, kind, local_id, display_name_fallback, \
     asset_path, image_path, size_or_duration, popularity_count, is_free, created_at, \
     is_downloaded, local_asset_path, is_favourite";

/// Content column list qualified with a table alias.
pub(crate) fn content_columns(alias: &str) -> String {
    CONTENT_COLUMNS
        .split(", ")
        .map(|column| format!("{}.{}", alias, column.trim()))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Database row representation of a content item
#[derive(Debug, FromRow)]
pub(crate) struct ContentItemRow {
    document_id: String,
    kind: String,
    local_id: i64,
    display_name_fallback: String,
    asset_path: String,
    image_path: String,
    size_or_duration: String,
    popularity_count: i64,
    is_free: bool,
    created_at: i64,
    is_downloaded: bool,
    local_asset_path: Option<String>,
    is_favourite: bool,
}

impl TryFrom<ContentItemRow> for ContentItem {
    type Error = LibraryError;

    fn try_from(row: ContentItemRow) -> Result<Self, Self::Error> {
        let kind = ContentKind::parse(&row.kind).ok_or(LibraryError::InvalidKind(row.kind))?;

        Ok(Self {
            document_id: row.document_id,
            kind,
            local_id: row.local_id,
            display_name_fallback: row.display_name_fallback,
            asset_path: row.asset_path,
            image_path: row.image_path,
            size_or_duration: row.size_or_duration,
            popularity_count: row.popularity_count,
            is_free: row.is_free,
            created_at: row.created_at,
            is_downloaded: row.is_downloaded,
            local_asset_path: row.local_asset_path,
            is_favourite: row.is_favourite,
        })
    }
}

// =============================================================================
// Child Records
// =============================================================================

/// Per-locale text for one field of one item.
///
/// Blank texts are never stored; a missing locale and a blank one read the same.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranslationRecord {
    pub document_id: String,
    pub field: TranslationField,
    pub texts: BTreeMap<Locale, String>,
}

impl TranslationRecord {
    pub fn new(
        document_id: impl Into<String>,
        field: TranslationField,
        texts: impl IntoIterator<Item = (Locale, String)>,
    ) -> Self {
        Self {
            document_id: document_id.into(),
            field,
            texts: non_blank(texts),
        }
    }

    pub fn text(&self, locale: Locale) -> Option<&str> {
        self.texts.get(&locale).map(String::as_str)
    }
}

/// Localized narration assets for one story.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioLocaleVariant {
    pub document_id: String,
    pub assets: BTreeMap<Locale, String>,
}

impl AudioLocaleVariant {
    pub fn new(
        document_id: impl Into<String>,
        assets: impl IntoIterator<Item = (Locale, String)>,
    ) -> Self {
        Self {
            document_id: document_id.into(),
            assets: non_blank(assets),
        }
    }

    pub fn asset(&self, locale: Locale) -> Option<&str> {
        self.assets.get(&locale).map(String::as_str)
    }
}

fn non_blank(values: impl IntoIterator<Item = (Locale, String)>) -> BTreeMap<Locale, String> {
    values
        .into_iter()
        .filter(|(_, value)| !value.trim().is_empty())
        .collect()
}

// =============================================================================
// Favourite Ledger
// =============================================================================

/// Moment an item was marked favourite
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FavouriteLedgerEntry {
    pub id: i64,
    pub item_id: String,
    pub item_kind: ContentKind,
    /// Epoch milliseconds
    pub favourited_at: i64,
}

#[derive(Debug, FromRow)]
pub(crate) struct FavouriteLedgerRow {
    id: i64,
    item_id: String,
    item_kind: String,
    favourited_at: i64,
}

impl TryFrom<FavouriteLedgerRow> for FavouriteLedgerEntry {
    type Error = LibraryError;

    fn try_from(row: FavouriteLedgerRow) -> Result<Self, Self::Error> {
        let item_kind =
            ContentKind::parse(&row.item_kind).ok_or(LibraryError::InvalidKind(row.item_kind))?;

        Ok(Self {
            id: row.id,
            item_id: row.item_id,
            item_kind,
            favourited_at: row.favourited_at,
        })
    }
}

/// Result of a favourite toggle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FavouriteToggle {
    pub document_id: String,
    pub kind: ContentKind,
    pub is_favourite: bool,
    /// Ledger timestamp when the item became a favourite
    pub favourited_at: Option<i64>,
}

// =============================================================================
// View Models
// =============================================================================

/// Fallback tier that produced a localized text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TextSource {
    /// The requested locale had a translation
    Requested,
    /// The base locale had a translation
    Base,
    /// Neither had one; the item's own fallback name was used
    Fallback,
}

/// Item plus its locale-appropriate name, description and audio asset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalizedContent {
    pub item: ContentItem,
    /// Locale the texts were resolved for
    pub locale: Locale,
    pub display_name: String,
    pub name_source: TextSource,
    pub description: Option<String>,
    pub audio_asset_path: String,
}
