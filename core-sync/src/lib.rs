//! # Content Sync Module
//!
//! Keeps the local content cache in line with the remote document store and
//! downloads assets on request.
//!
//! ## Overview
//!
//! - Fetching full snapshots per content kind through `RemoteContentGateway`
//! - Reconciling them against cached rows without touching locally owned state
//! - Applying the result atomically behind the library's write gate
//! - Recording every attempt in the sync run history
//! - Retrying in the background with exponential backoff
//! - Downloading assets and recording them once confirmed on disk
//!
//! ## Components
//!
//! - **Reconciliation** (`reconcile`): Pure snapshot-vs-cache planning
//! - **Sync Coordinator** (`coordinator`): Fetch, plan, apply, report
//! - **Sync Runs** (`job`, `repository`): Attempt records and their persistence
//! - **Sync Worker** (`worker`): Background loop with retry
//! - **Download Coordinator** (`download`): Cancellable downloads with a terminal state machine

pub mod coordinator;
pub mod download;
pub mod error;
pub mod job;
pub mod reconcile;
pub mod repository;
pub mod worker;

pub use coordinator::{SyncConfig, SyncCoordinator};
pub use download::{DownloadCoordinator, DownloadHandle, DownloadState};
pub use error::{Result, SyncError};
pub use job::{SyncRun, SyncRunId, SyncRunStatus, SyncSummary};
pub use reconcile::{
    ChildRecord, ExistingState, OrphanedChildRow, ReconcilePlan, RemoteSnapshot, SkippedItem,
};
pub use repository::{SqliteSyncRunRepository, SyncRunRepository};
pub use worker::{SyncWorker, SyncWorkerConfig, SyncWorkerHandle};
