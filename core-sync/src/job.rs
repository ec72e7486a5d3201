//! # Sync Runs
//!
//! Records of individual synchronize attempts.
//!
//! ## Overview
//!
//! Every attempt to synchronize a content kind ends in exactly one
//! [`SyncRun`], either `Completed` with the counts of its [`SyncSummary`] or
//! `Failed` with the error message. Runs are append-only history.
//!
//! ```text
//! synchronize(kind) ─┬─→ Completed { inserted, updated, ... }
//!                    └─→ Failed { error_message }
//! ```

use crate::reconcile::ReconcilePlan;
use crate::{Result, SyncError};
use bridge_traits::ContentKind;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

// ============================================================================
// ID Types
// ============================================================================

/// Unique identifier for a sync run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SyncRunId(Uuid);

impl SyncRunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse a run ID from its stored form
    ///
    /// # Errors
    ///
    /// Returns `Storage` if the string is not a valid UUID
    pub fn from_string(s: &str) -> Result<Self> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| SyncError::Storage(format!("Invalid sync run id '{}': {}", s, e)))
    }

    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for SyncRunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SyncRunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Status
// ============================================================================

/// Outcome of a sync run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncRunStatus {
    Completed,
    Failed,
}

impl SyncRunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncRunStatus::Completed => "completed",
            SyncRunStatus::Failed => "failed",
        }
    }
}

impl FromStr for SyncRunStatus {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "completed" => Ok(SyncRunStatus::Completed),
            "failed" => Ok(SyncRunStatus::Failed),
            _ => Err(SyncError::Storage(format!("Invalid sync run status: {}", s))),
        }
    }
}

impl std::fmt::Display for SyncRunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Summary
// ============================================================================

/// Counts reported by a completed synchronize
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncSummary {
    pub kind: ContentKind,
    pub inserted: u64,
    pub updated: u64,
    pub unchanged: u64,
    pub translations_written: u64,
    pub translations_removed: u64,
    pub audio_written: u64,
    pub audio_removed: u64,
    /// Child rows dropped because their cross-reference matched no item
    pub orphaned: u64,
    /// Remote items rejected by validation
    pub skipped: u64,
    /// Withdrawn items deleted from the cache
    pub pruned: u64,
    pub duration_ms: u64,
}

impl SyncSummary {
    pub fn empty(kind: ContentKind) -> Self {
        Self {
            kind,
            inserted: 0,
            updated: 0,
            unchanged: 0,
            translations_written: 0,
            translations_removed: 0,
            audio_written: 0,
            audio_removed: 0,
            orphaned: 0,
            skipped: 0,
            pruned: 0,
            duration_ms: 0,
        }
    }

    /// Counts of an applied plan
    pub fn from_plan(kind: ContentKind, plan: &ReconcilePlan, pruned: u64) -> Self {
        Self {
            kind,
            inserted: plan.inserts.len() as u64,
            updated: plan.updates.len() as u64,
            unchanged: plan.unchanged as u64,
            translations_written: plan.translation_upserts.len() as u64,
            translations_removed: plan.translation_removals.len() as u64,
            audio_written: plan.audio_upserts.len() as u64,
            audio_removed: plan.audio_removals.len() as u64,
            orphaned: plan.orphans.len() as u64,
            skipped: plan.skipped.len() as u64,
            pruned,
            duration_ms: 0,
        }
    }

    /// Whether the run changed any cached row
    pub fn has_changes(&self) -> bool {
        self.inserted > 0
            || self.updated > 0
            || self.translations_written > 0
            || self.translations_removed > 0
            || self.audio_written > 0
            || self.audio_removed > 0
            || self.pruned > 0
    }
}

// ============================================================================
// Run record
// ============================================================================

/// One recorded synchronize attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncRun {
    pub id: SyncRunId,
    pub kind: ContentKind,
    pub status: SyncRunStatus,
    /// Epoch milliseconds
    pub started_at: i64,
    pub finished_at: i64,
    pub inserted: u64,
    pub updated: u64,
    pub unchanged: u64,
    pub orphaned: u64,
    pub pruned: u64,
    pub error_message: Option<String>,
}

impl SyncRun {
    pub fn completed(
        id: SyncRunId,
        summary: &SyncSummary,
        started_at: i64,
        finished_at: i64,
    ) -> Self {
        Self {
            id,
            kind: summary.kind,
            status: SyncRunStatus::Completed,
            started_at,
            finished_at,
            inserted: summary.inserted,
            updated: summary.updated,
            unchanged: summary.unchanged,
            orphaned: summary.orphaned,
            pruned: summary.pruned,
            error_message: None,
        }
    }

    pub fn failed(
        id: SyncRunId,
        kind: ContentKind,
        error: &SyncError,
        started_at: i64,
        finished_at: i64,
    ) -> Self {
        Self {
            id,
            kind,
            status: SyncRunStatus::Failed,
            started_at,
            finished_at,
            inserted: 0,
            updated: 0,
            unchanged: 0,
            orphaned: 0,
            pruned: 0,
            error_message: Some(error.to_string()),
        }
    }

    pub fn duration_ms(&self) -> u64 {
        (self.finished_at - self.started_at).max(0) as u64
    }
}
