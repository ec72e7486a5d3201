//! # Download Coordinator
//!
//! Downloads the audio asset of a cached item and records it once the file
//! is confirmed on disk.
//!
//! ## State machine
//!
//! ```text
//! Pending → Started → Progress(n)* ─┬→ Completed(path)
//!    │         │          │         ├→ Failed(reason)
//!    └─────────┴──────────┴─────────┴→ Cancelled
//! ```
//!
//! Terminal states are never left; updates arriving afterwards are ignored.
//! `is_downloaded` is only set after the transport reported completion, the
//! file was found at the reported path and no cancellation was observed.
//! A cancellation that wins the race removes the finished file.

use crate::{Result, SyncError};
use bridge_traits::{DownloadTransport, DownloadUpdate, Locale};
use core_library::repositories::{
    AudioLocaleRepository, ContentRepository, SqliteAudioLocaleRepository,
    SqliteContentRepository,
};
use core_library::{ContentItem, LibraryDatabase};
use core_runtime::events::{CoreEvent, DownloadEvent, EventBus, LibraryEvent};
use core_runtime::logging::strip_path;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Extension used when the asset path has none
const DEFAULT_ASSET_EXTENSION: &str = "mp3";

/// Observable state of one download
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "value")]
pub enum DownloadState {
    Pending,
    Started { total_bytes: Option<u64> },
    Progress(u8),
    Completed(PathBuf),
    Failed(String),
    Cancelled,
}

impl DownloadState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DownloadState::Completed(_) | DownloadState::Failed(_) | DownloadState::Cancelled
        )
    }
}

/// Handle to one running download
#[derive(Debug)]
pub struct DownloadHandle {
    document_id: String,
    state: watch::Receiver<DownloadState>,
    cancel: CancellationToken,
}

impl DownloadHandle {
    pub fn document_id(&self) -> &str {
        &self.document_id
    }

    /// Current state
    pub fn state(&self) -> DownloadState {
        self.state.borrow().clone()
    }

    /// Receiver that observes every transition
    pub fn watch(&self) -> watch::Receiver<DownloadState> {
        self.state.clone()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait for the terminal state
    pub async fn wait(mut self) -> DownloadState {
        loop {
            {
                let current = self.state.borrow_and_update();
                if current.is_terminal() {
                    return current.clone();
                }
            }
            if self.state.changed().await.is_err() {
                return self.state.borrow().clone();
            }
        }
    }
}

/// Starts, tracks and persists asset downloads
pub struct DownloadCoordinator {
    db: LibraryDatabase,
    transport: Arc<dyn DownloadTransport>,
    event_bus: EventBus,
    download_dir: PathBuf,
    content: SqliteContentRepository,
    audio: SqliteAudioLocaleRepository,

    /// Cancellation tokens of running downloads by document id
    active: Arc<Mutex<HashMap<String, CancellationToken>>>,
}

impl DownloadCoordinator {
    pub fn new(
        db: LibraryDatabase,
        transport: Arc<dyn DownloadTransport>,
        event_bus: EventBus,
        download_dir: impl Into<PathBuf>,
    ) -> Self {
        let content = SqliteContentRepository::new(db.pool().clone());
        let audio = SqliteAudioLocaleRepository::new(db.pool().clone());
        Self {
            db,
            transport,
            event_bus,
            download_dir: download_dir.into(),
            content,
            audio,
            active: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Download the item's default asset.
    ///
    /// # Errors
    ///
    /// - `NotFound` if no item has this id
    /// - `DownloadInProgress` if the item is already downloading
    #[instrument(skip(self))]
    pub async fn start(&self, document_id: &str) -> Result<DownloadHandle> {
        let item = self.find_item(document_id).await?;
        let asset = item.asset_path.clone();
        self.spawn(item, asset).await
    }

    /// Download the narration for `locale`, falling back to the base locale
    /// and then the default asset.
    #[instrument(skip(self))]
    pub async fn start_localized(&self, document_id: &str, locale: Locale) -> Result<DownloadHandle> {
        let item = self.find_item(document_id).await?;

        let variant = if item.kind.supports_audio_locales() {
            self.audio.find(document_id).await?
        } else {
            None
        };

        let asset = variant
            .as_ref()
            .and_then(|variant| variant.asset(locale).or_else(|| variant.asset(Locale::BASE)))
            .map(str::to_string)
            .unwrap_or_else(|| item.asset_path.clone());

        self.spawn(item, asset).await
    }

    /// Cancel a running download. Returns false if none is running.
    pub async fn cancel(&self, document_id: &str) -> bool {
        match self.active.lock().await.get(document_id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub async fn cancel_all(&self) {
        for token in self.active.lock().await.values() {
            token.cancel();
        }
    }

    pub async fn is_downloading(&self, document_id: &str) -> bool {
        self.active.lock().await.contains_key(document_id)
    }

    /// Clear the item's download state, then delete the file.
    ///
    /// Returns false if the item was not downloaded. A running download of
    /// the item is cancelled first.
    #[instrument(skip(self))]
    pub async fn remove_download(&self, document_id: &str) -> Result<bool> {
        self.cancel(document_id).await;

        let item = self.find_item(document_id).await?;
        if !item.is_downloaded {
            return Ok(false);
        }

        let mut tx = self.db.begin_write().await?;
        SqliteContentRepository::clear_download(tx.conn(), document_id).await?;
        tx.mark_changed(item.kind);
        tx.commit().await?;

        if let Some(path) = &item.local_asset_path {
            match tokio::fs::remove_file(path).await {
                Ok(()) => debug!(file = %strip_path(path), "Removed downloaded asset"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    warn!(file = %strip_path(path), "Downloaded asset already missing");
                }
                Err(e) => warn!(file = %strip_path(path), error = %e, "Failed to remove asset"),
            }
        }

        self.event_bus
            .emit(CoreEvent::Library(LibraryEvent::DownloadRemoved {
                document_id: document_id.to_string(),
            }))
            .ok();

        info!(document_id, "Download removed");
        Ok(true)
    }

    /// `<download_dir>/<kind>/<document_id>.<ext>`
    pub fn destination_for(&self, item: &ContentItem, asset: &str) -> PathBuf {
        let extension = Path::new(asset)
            .extension()
            .and_then(|ext| ext.to_str())
            .filter(|ext| !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()))
            .unwrap_or(DEFAULT_ASSET_EXTENSION);

        let file_stem: String = item
            .document_id
            .chars()
            .map(|c| if matches!(c, '/' | '\\' | ':' | '.') { '_' } else { c })
            .collect();

        self.download_dir
            .join(item.kind.as_str())
            .join(format!("{}.{}", file_stem, extension))
    }

    async fn find_item(&self, document_id: &str) -> Result<ContentItem> {
        self.content
            .find_by_id(document_id)
            .await?
            .ok_or_else(|| SyncError::content_not_found(document_id))
    }

    async fn spawn(&self, item: ContentItem, asset: String) -> Result<DownloadHandle> {
        let cancel = CancellationToken::new();
        {
            let mut active = self.active.lock().await;
            if active.contains_key(&item.document_id) {
                return Err(SyncError::DownloadInProgress {
                    document_id: item.document_id,
                });
            }
            active.insert(item.document_id.clone(), cancel.clone());
        }

        let destination = self.destination_for(&item, &asset);
        let (state_tx, state_rx) = watch::channel(DownloadState::Pending);

        let handle = DownloadHandle {
            document_id: item.document_id.clone(),
            state: state_rx,
            cancel: cancel.clone(),
        };

        let task = DownloadTask {
            db: self.db.clone(),
            event_bus: self.event_bus.clone(),
            active: Arc::clone(&self.active),
            item,
            state: state_tx,
            cancel,
        };
        let updates = self.transport.download(&asset, &destination, task.cancel.clone());

        info!(
            document_id = %task.item.document_id,
            file = %strip_path(&destination.to_string_lossy()),
            "Download started"
        );

        tokio::spawn(task.run(updates));

        Ok(handle)
    }
}

struct DownloadTask {
    db: LibraryDatabase,
    event_bus: EventBus,
    active: Arc<Mutex<HashMap<String, CancellationToken>>>,
    item: ContentItem,
    state: watch::Sender<DownloadState>,
    cancel: CancellationToken,
}

impl DownloadTask {
    async fn run(self, mut updates: futures::stream::BoxStream<'static, DownloadUpdate>) {
        let mut last_percent: Option<u8> = None;

        while let Some(update) = updates.next().await {
            let next = match update {
                DownloadUpdate::Started { total_bytes } => DownloadState::Started { total_bytes },
                DownloadUpdate::Progress { percent } => {
                    let percent = percent.min(100);
                    if last_percent.is_some_and(|last| percent <= last) {
                        continue;
                    }
                    last_percent = Some(percent);
                    DownloadState::Progress(percent)
                }
                DownloadUpdate::Completed { path } => self.persist(path).await,
                DownloadUpdate::Failed { reason } => DownloadState::Failed(reason),
                DownloadUpdate::Cancelled => DownloadState::Cancelled,
            };

            if next.is_terminal() {
                self.finish(next).await;
                return;
            }
            self.transition(next);
        }

        let fallback = if self.cancel.is_cancelled() {
            DownloadState::Cancelled
        } else {
            DownloadState::Failed("transport ended without a result".to_string())
        };
        self.finish(fallback).await;
    }

    /// Release the item for new downloads, then publish the terminal state.
    async fn finish(&self, terminal: DownloadState) {
        self.active.lock().await.remove(&self.item.document_id);
        self.transition(terminal);
    }

    /// Mark the item downloaded unless cancellation or a missing file wins.
    async fn persist(&self, path: PathBuf) -> DownloadState {
        if self.cancel.is_cancelled() {
            discard(&path).await;
            return DownloadState::Cancelled;
        }

        match tokio::fs::try_exists(&path).await {
            Ok(true) => {}
            Ok(false) => {
                return DownloadState::Failed(format!(
                    "downloaded file missing: {}",
                    strip_path(&path.to_string_lossy())
                ))
            }
            Err(e) => return DownloadState::Failed(format!("cannot inspect downloaded file: {}", e)),
        }

        let path_str = path.to_string_lossy().to_string();
        let persisted = async {
            let mut tx = self.db.begin_write().await?;

            // Cancellation observed under the write gate still wins.
            if self.cancel.is_cancelled() {
                return Ok(false);
            }

            let updated =
                SqliteContentRepository::mark_downloaded(tx.conn(), &self.item.document_id, &path_str)
                    .await?;
            if !updated {
                return Err(SyncError::content_not_found(&self.item.document_id));
            }

            tx.mark_changed(self.item.kind);
            tx.commit().await?;
            Ok::<_, SyncError>(true)
        }
        .await;

        match persisted {
            Ok(true) => DownloadState::Completed(path),
            Ok(false) => {
                discard(&path).await;
                DownloadState::Cancelled
            }
            Err(e) => {
                warn!(document_id = %self.item.document_id, error = %e, "Failed to record download");
                discard(&path).await;
                DownloadState::Failed(e.to_string())
            }
        }
    }

    /// Apply `next` unless a terminal state was already reached.
    fn transition(&self, next: DownloadState) {
        let event = self.event_for(&next);
        let applied = self.state.send_if_modified(|current| {
            if current.is_terminal() {
                return false;
            }
            *current = next;
            true
        });

        if let (true, Some(event)) = (applied, event) {
            match &event {
                DownloadEvent::Completed { document_id, path } => {
                    info!(document_id = %document_id, file = %strip_path(path), "Download completed")
                }
                DownloadEvent::Failed { document_id, reason } => {
                    warn!(document_id = %document_id, reason = %reason, "Download failed")
                }
                DownloadEvent::Cancelled { document_id } => {
                    info!(document_id = %document_id, "Download cancelled")
                }
                _ => {}
            }
            self.event_bus.emit(CoreEvent::Download(event)).ok();
        }
    }

    fn event_for(&self, state: &DownloadState) -> Option<DownloadEvent> {
        let document_id = self.item.document_id.clone();
        let event = match state {
            DownloadState::Pending => return None,
            DownloadState::Started { total_bytes } => DownloadEvent::Started {
                document_id,
                total_bytes: *total_bytes,
            },
            DownloadState::Progress(percent) => DownloadEvent::Progress {
                document_id,
                percent: *percent,
            },
            DownloadState::Completed(path) => DownloadEvent::Completed {
                document_id,
                path: path.to_string_lossy().to_string(),
            },
            DownloadState::Failed(reason) => DownloadEvent::Failed {
                document_id,
                reason: reason.clone(),
            },
            DownloadState::Cancelled => DownloadEvent::Cancelled { document_id },
        };
        Some(event)
    }
}

async fn discard(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(file = %strip_path(&path.to_string_lossy()), error = %e, "Failed to discard asset");
        }
    }
}
