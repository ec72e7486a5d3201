//! # Content Library Module
//!
//! Owns the local content cache database and the services that read and
//! mutate it outside of synchronization.
//!
//! ## Overview
//!
//! This module manages:
//! - SQLite schema and migrations for content items, translations,
//!   audio-locale variants and the favourite ordering ledger
//! - The write gate that serializes every mutating transaction
//! - Change notification for observable queries
//! - Repository patterns for data access
//! - Favourite toggling with LIFO ordering
//! - The query façade consumed by presentation

pub mod changes;
pub mod db;
pub mod error;
pub mod favourites;
pub mod models;
pub mod query;
pub mod repositories;

pub use changes::{ChangeNotifier, ContentChange};
pub use db::{create_pool, create_test_pool, DatabaseConfig, LibraryDatabase, WriteTransaction};
pub use error::{LibraryError, Result};
pub use favourites::{FavouriteAudit, FavouriteService};
pub use models::{
    AudioLocaleVariant, ContentItem, ContentKind, FavouriteLedgerEntry, FavouriteToggle, Locale,
    LocalizedContent, TextSource, TranslationField, TranslationRecord,
};
pub use query::ContentQueryService;
