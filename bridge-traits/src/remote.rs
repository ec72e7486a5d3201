//! Remote Content Abstraction
//!
//! Vocabulary shared by every layer of the content core, plus the contract of
//! the remote document store that content is synchronized from.
//!
//! The gateway is stateless per call and returns full snapshots. It does not
//! cache, and callers treat any error as "remote unavailable" without
//! interpreting its subtype.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::Result;

/// Discriminator between the two kinds of content the app serves.
///
/// Used as the single tag for table rows, cross-reference joins and
/// favourite-ledger entries.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    /// Music track (lullaby)
    Track,
    /// Narrated story
    Story,
}

impl ContentKind {
    pub const ALL: [ContentKind; 2] = [ContentKind::Track, ContentKind::Story];

    /// Stored tag for this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentKind::Track => "track",
            ContentKind::Story => "story",
        }
    }

    /// Parse a stored tag. Unknown tags yield `None`.
    pub fn parse(tag: &str) -> Option<Self> {
        match tag.trim().to_ascii_lowercase().as_str() {
            "track" => Some(ContentKind::Track),
            "story" => Some(ContentKind::Story),
            _ => None,
        }
    }

    /// Only stories ship per-locale narration.
    pub fn supports_audio_locales(&self) -> bool {
        matches!(self, ContentKind::Story)
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Supported locales.
///
/// The set is closed: every locale has its own column in the translation and
/// audio-locale tables.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Locale {
    En,
    Ru,
    Uk,
    De,
    Fr,
    Es,
    Pt,
    It,
    Pl,
    Tr,
}

impl Locale {
    /// Locale every other locale falls back to.
    pub const BASE: Locale = Locale::En;

    pub const ALL: [Locale; 10] = [
        Locale::En,
        Locale::Ru,
        Locale::Uk,
        Locale::De,
        Locale::Fr,
        Locale::Es,
        Locale::Pt,
        Locale::It,
        Locale::Pl,
        Locale::Tr,
    ];

    /// Two-letter ISO 639-1 code.
    pub fn code(&self) -> &'static str {
        match self {
            Locale::En => "en",
            Locale::Ru => "ru",
            Locale::Uk => "uk",
            Locale::De => "de",
            Locale::Fr => "fr",
            Locale::Es => "es",
            Locale::Pt => "pt",
            Locale::It => "it",
            Locale::Pl => "pl",
            Locale::Tr => "tr",
        }
    }

    /// Parse a locale code such as `fr`, `FR`, `fr-FR` or `pt_BR`.
    ///
    /// Only the primary language subtag is considered.
    pub fn parse(code: &str) -> Option<Self> {
        let primary = code
            .trim()
            .split(['-', '_'])
            .next()
            .unwrap_or_default()
            .to_ascii_lowercase();

        Self::ALL
            .iter()
            .copied()
            .find(|locale| locale.code() == primary)
    }

    /// Parse, falling back to [`Locale::BASE`] for unknown codes.
    pub fn parse_or_base(code: &str) -> Self {
        Self::parse(code).unwrap_or(Self::BASE)
    }
}

impl Default for Locale {
    fn default() -> Self {
        Self::BASE
    }
}

impl fmt::Display for Locale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Which text a translation record carries.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum TranslationField {
    Name,
    Description,
}

impl TranslationField {
    pub const ALL: [TranslationField; 2] = [TranslationField::Name, TranslationField::Description];

    pub fn as_str(&self) -> &'static str {
        match self {
            TranslationField::Name => "name",
            TranslationField::Description => "description",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "name" => Some(TranslationField::Name),
            "description" => Some(TranslationField::Description),
            _ => None,
        }
    }
}

impl fmt::Display for TranslationField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Canonical content record as delivered by the remote store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteContentItem {
    /// Remote-assigned, globally unique identifier
    pub document_id: String,
    /// Cross-reference key used by translation and audio-locale records
    pub local_id: i64,
    pub kind: ContentKind,
    /// Display name used when no translation applies
    pub display_name_fallback: String,
    /// Remote location of the playable asset
    pub asset_path: String,
    pub image_path: String,
    /// File size for tracks, running time for stories, as delivered
    pub size_or_duration: String,
    pub popularity_count: i64,
    pub is_free: bool,
    /// Creation time in epoch milliseconds
    pub created_at: i64,
}

/// Per-locale text for one item, correlated by cross-reference id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteTranslation {
    pub id: i64,
    pub field: TranslationField,
    pub texts: BTreeMap<Locale, String>,
}

/// Per-locale audio asset paths for one story, correlated by cross-reference id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteAudioLocale {
    pub id: i64,
    pub assets: BTreeMap<Locale, String>,
}

/// Remote document store gateway
///
/// Implementations fetch full snapshots per content kind. They own their
/// timeouts and retries; the caller only distinguishes success from failure.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::remote::{ContentKind, RemoteContentGateway};
///
/// async fn count(gateway: &dyn RemoteContentGateway) -> usize {
///     gateway
///         .fetch_content_items(ContentKind::Story)
///         .await
///         .map(|items| items.len())
///         .unwrap_or(0)
/// }
/// ```
#[async_trait]
pub trait RemoteContentGateway: Send + Sync {
    /// Fetch every content item of the given kind.
    async fn fetch_content_items(&self, kind: ContentKind) -> Result<Vec<RemoteContentItem>>;

    /// Fetch every translation record of the given kind.
    async fn fetch_translations(&self, kind: ContentKind) -> Result<Vec<RemoteTranslation>>;

    /// Fetch every audio-locale record of the given kind.
    ///
    /// Kinds without localized narration have none.
    async fn fetch_audio_locales(&self, kind: ContentKind) -> Result<Vec<RemoteAudioLocale>> {
        let _ = kind;
        Ok(Vec::new())
    }
}
