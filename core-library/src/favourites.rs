//! Favourite toggling with LIFO ordering.
//!
//! `content_items.is_favourite` decides membership and the ledger decides
//! order. Both are always written together in one gated transaction.

use crate::db::LibraryDatabase;
use crate::error::{LibraryError, Result};
use crate::models::{ContentKind, FavouriteToggle};
use crate::repositories::{SqliteContentRepository, SqliteFavouriteLedgerRepository};
use bridge_traits::time::Clock;
use serde::{Deserialize, Serialize};
use sqlx::{query_scalar, SqliteConnection};
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Mismatches between the favourite flag and the ledger for one kind
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FavouriteAudit {
    /// Items flagged as favourite with no ledger entry
    pub flagged_without_entry: Vec<String>,
    /// Ledger entries whose item exists but is not flagged
    pub entries_without_flag: Vec<String>,
    /// Ledger entries with no item of the same kind
    pub dangling_entries: Vec<String>,
}

impl FavouriteAudit {
    pub fn is_consistent(&self) -> bool {
        self.flagged_without_entry.is_empty()
            && self.entries_without_flag.is_empty()
            && self.dangling_entries.is_empty()
    }
}

/// Toggles favourites and keeps the ledger consistent with the flag
pub struct FavouriteService {
    db: LibraryDatabase,
    clock: Arc<dyn Clock>,
}

impl FavouriteService {
    pub fn new(db: LibraryDatabase, clock: Arc<dyn Clock>) -> Self {
        Self { db, clock }
    }

    /// Flip the favourite state of the item matching both id and kind.
    ///
    /// # Errors
    ///
    /// `NotFound` when no such item exists; state is left unchanged.
    #[instrument(skip(self))]
    pub async fn toggle(&self, item_id: &str, kind: ContentKind) -> Result<FavouriteToggle> {
        let mut tx = self.db.begin_write().await?;

        let item = SqliteContentRepository::find_in_by_kind(tx.conn(), item_id, kind)
            .await?
            .ok_or_else(|| LibraryError::content_not_found(item_id))?;

        let is_favourite = !item.is_favourite;
        SqliteContentRepository::set_favourite(tx.conn(), item_id, kind, is_favourite).await?;

        let favourited_at = if is_favourite {
            let entry = SqliteFavouriteLedgerRepository::upsert(
                tx.conn(),
                item_id,
                kind,
                self.clock.unix_timestamp_millis(),
            )
            .await?;
            Some(entry.favourited_at)
        } else {
            SqliteFavouriteLedgerRepository::delete(tx.conn(), item_id, kind).await?;
            None
        };

        tx.mark_changed(kind);
        tx.commit().await?;

        info!(item_id, kind = %kind, is_favourite, "Toggled favourite");

        Ok(FavouriteToggle {
            document_id: item_id.to_string(),
            kind,
            is_favourite,
            favourited_at,
        })
    }

    /// Toggle using a stored kind tag such as `"track"`
    pub async fn toggle_tagged(&self, item_id: &str, kind_tag: &str) -> Result<FavouriteToggle> {
        let kind = ContentKind::parse(kind_tag)
            .ok_or_else(|| LibraryError::InvalidKind(kind_tag.to_string()))?;
        self.toggle(item_id, kind).await
    }

    #[instrument(skip(self))]
    pub async fn is_favourite(&self, item_id: &str, kind: ContentKind) -> Result<bool> {
        let flag = query_scalar::<_, bool>(
            "SELECT is_favourite FROM content_items WHERE document_id = ? AND kind = ?",
        )
        .bind(item_id)
        .bind(kind.as_str())
        .fetch_optional(self.db.pool())
        .await?;

        flag.ok_or_else(|| LibraryError::content_not_found(item_id))
    }

    /// Report flag/ledger mismatches without changing anything
    #[instrument(skip(self))]
    pub async fn audit(&self, kind: ContentKind) -> Result<FavouriteAudit> {
        let mut tx = self.db.pool().begin().await?;
        let audit = audit_in(&mut tx, kind).await?;
        tx.commit().await?;
        Ok(audit)
    }

    /// Make the ledger authoritative: unflag items without an entry, re-flag
    /// items whose entry exists and drop entries without an item.
    ///
    /// Returns the mismatches that were repaired.
    #[instrument(skip(self))]
    pub async fn repair(&self, kind: ContentKind) -> Result<FavouriteAudit> {
        let mut tx = self.db.begin_write().await?;
        let audit = audit_in(tx.conn(), kind).await?;

        if audit.is_consistent() {
            return Ok(audit);
        }

        for item_id in &audit.flagged_without_entry {
            SqliteContentRepository::set_favourite(tx.conn(), item_id, kind, false).await?;
        }
        for item_id in &audit.entries_without_flag {
            SqliteContentRepository::set_favourite(tx.conn(), item_id, kind, true).await?;
        }
        for item_id in &audit.dangling_entries {
            SqliteFavouriteLedgerRepository::delete(tx.conn(), item_id, kind).await?;
        }

        tx.mark_changed(kind);
        tx.commit().await?;

        warn!(
            kind = %kind,
            unflagged = audit.flagged_without_entry.len(),
            reflagged = audit.entries_without_flag.len(),
            dropped = audit.dangling_entries.len(),
            "Repaired favourite ledger"
        );

        Ok(audit)
    }
}

async fn audit_in(conn: &mut SqliteConnection, kind: ContentKind) -> Result<FavouriteAudit> {
    let flagged_without_entry = query_scalar::<_, String>(
        "SELECT c.document_id FROM content_items c \
         LEFT JOIN favourite_ledger f ON f.item_id = c.document_id AND f.item_kind = c.kind \
         WHERE c.kind = ? AND c.is_favourite = 1 AND f.id IS NULL \
         ORDER BY c.document_id",
    )
    .bind(kind.as_str())
    .fetch_all(&mut *conn)
    .await?;

    let entries_without_flag = query_scalar::<_, String>(
        "SELECT f.item_id FROM favourite_ledger f \
         INNER JOIN content_items c ON c.document_id = f.item_id AND c.kind = f.item_kind \
         WHERE f.item_kind = ? AND c.is_favourite = 0 \
         ORDER BY f.item_id",
    )
    .bind(kind.as_str())
    .fetch_all(&mut *conn)
    .await?;

    let dangling_entries = query_scalar::<_, String>(
        "SELECT f.item_id FROM favourite_ledger f \
         LEFT JOIN content_items c ON c.document_id = f.item_id AND c.kind = f.item_kind \
         WHERE f.item_kind = ? AND c.document_id IS NULL \
         ORDER BY f.item_id",
    )
    .bind(kind.as_str())
    .fetch_all(&mut *conn)
    .await?;

    Ok(FavouriteAudit {
        flagged_without_entry,
        entries_without_flag,
        dangling_entries,
    })
}
