//! Core service façade and bootstrap.
//!
//! This crate wires the host-provided collaborators (remote gateway or HTTP
//! client, download transport, clock) into the content core and owns every
//! long-lived handle: the database, the event bus, the display language and
//! the background sync worker. Desktop apps typically enable the
//! `desktop-shims` feature (which depends on `bridge-desktop`) so the HTTP
//! client and download transport are filled in by default.
//!
//! ```ignore
//! use core_runtime::config::{CoreConfig, RemoteStoreConfig};
//! use core_service::CoreService;
//!
//! let config = CoreConfig::builder()
//!     .database_path("/data/content.db")
//!     .download_dir("/data/assets")
//!     .remote_store(RemoteStoreConfig::new("nightlight-prod"))
//!     .build()?;
//!
//! let core = CoreService::bootstrap(config).await?;
//! core.sync_all().await;
//! let stories = core.all_items(ContentKind::Story).await?;
//! core.shutdown().await;
//! ```

pub mod error;
pub mod language;

pub use error::{CoreError, Result};
pub use language::LanguageState;

#[cfg(feature = "desktop-shims")]
pub use bridge_desktop::{HttpDownloadTransport, ReqwestHttpClient};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bridge_traits::{ContentKind, Locale, RemoteContentGateway};
use core_library::{
    ContentItem, ContentQueryService, DatabaseConfig, FavouriteAudit, FavouriteService,
    FavouriteToggle, LibraryDatabase, LocalizedContent,
};
use core_runtime::config::CoreConfig;
use core_runtime::events::{CoreEvent, EventBus, EventStream, LibraryEvent};
use core_runtime::logging::strip_path;
use core_sync::{
    DownloadCoordinator, DownloadHandle, SyncConfig, SyncCoordinator, SyncRun, SyncSummary,
    SyncWorker, SyncWorkerConfig, SyncWorkerHandle,
};
use futures::stream::{self, BoxStream, StreamExt};
use provider_docstore::DocStoreConnector;
use tokio::sync::{watch, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Primary façade exposed to host applications.
///
/// Cloning is cheap; clones share every handle.
#[derive(Clone)]
pub struct CoreService {
    inner: Arc<Inner>,
}

struct Inner {
    config: CoreConfig,
    db: LibraryDatabase,
    event_bus: EventBus,
    language: LanguageState,
    sync: Arc<SyncCoordinator>,
    favourites: FavouriteService,
    query: ContentQueryService,
    downloads: DownloadCoordinator,
    workers: Mutex<Vec<CancellationToken>>,
    shut_down: AtomicBool,
}

impl CoreService {
    /// Open the cache and wire every component described by `config`.
    ///
    /// # Errors
    ///
    /// - `CapabilityMissing` when no gateway can be resolved
    /// - `Library` when the database cannot be opened or migrated
    #[instrument(skip(config), fields(in_memory = config.is_in_memory()))]
    pub async fn bootstrap(config: CoreConfig) -> Result<Self> {
        let db_config = DatabaseConfig::from_path(config.database_path.clone())
            .change_buffer_size(config.event_buffer_size);

        let gateway = resolve_gateway(&config)?;
        let db = LibraryDatabase::open(db_config).await?;
        let event_bus = EventBus::new(config.event_buffer_size);

        let sync = Arc::new(SyncCoordinator::new(
            SyncConfig::from(&config.sync),
            db.clone(),
            gateway,
            event_bus.clone(),
            Arc::clone(&config.clock),
        ));
        let favourites = FavouriteService::new(db.clone(), Arc::clone(&config.clock));
        let query = ContentQueryService::new(db.clone());
        let downloads = DownloadCoordinator::new(
            db.clone(),
            Arc::clone(&config.download_transport),
            event_bus.clone(),
            config.download_dir.clone(),
        );

        info!(
            download_dir = strip_path(&config.download_dir.to_string_lossy()),
            locale = config.default_locale.code(),
            "Content core ready"
        );

        Ok(Self {
            inner: Arc::new(Inner {
                language: LanguageState::new(config.default_locale),
                config,
                db,
                event_bus,
                sync,
                favourites,
                query,
                downloads,
                workers: Mutex::new(Vec::new()),
                shut_down: AtomicBool::new(false),
            }),
        })
    }

    pub fn config(&self) -> &CoreConfig {
        &self.inner.config
    }

    /// The cache database, for host-side inspection and maintenance
    pub fn database(&self) -> &LibraryDatabase {
        &self.inner.db
    }

    pub fn language(&self) -> &LanguageState {
        &self.inner.language
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.shut_down.load(Ordering::SeqCst)
    }

    fn ensure_running(&self) -> Result<()> {
        if self.is_shut_down() {
            Err(CoreError::ShutDown)
        } else {
            Ok(())
        }
    }

    // =========================================================================
    // Sync
    // =========================================================================

    pub async fn sync(&self, kind: ContentKind) -> Result<SyncSummary> {
        self.ensure_running()?;
        Ok(self.inner.sync.synchronize(kind).await?)
    }

    /// Synchronize every configured kind; one kind failing does not stop the rest
    pub async fn sync_all(&self) -> Vec<(ContentKind, Result<SyncSummary>)> {
        if self.is_shut_down() {
            return self
                .inner
                .sync
                .config()
                .kinds
                .iter()
                .map(|kind| (*kind, Err(CoreError::ShutDown)))
                .collect();
        }

        self.inner
            .sync
            .synchronize_all()
            .await
            .into_iter()
            .map(|(kind, result)| (kind, result.map_err(CoreError::from)))
            .collect()
    }

    pub async fn last_successful_sync(&self, kind: ContentKind) -> Result<Option<SyncRun>> {
        Ok(self.inner.sync.last_successful_sync(kind).await?)
    }

    pub async fn sync_history(&self, kind: ContentKind, limit: u32) -> Result<Vec<SyncRun>> {
        Ok(self.inner.sync.history(kind, limit).await?)
    }

    /// Spawn the background sync loop.
    ///
    /// `interval` overrides the configured one; `None` falls back to it. The
    /// returned handle can stop the worker early, and `shutdown` stops it too.
    pub async fn start_background_sync(
        &self,
        interval: Option<Duration>,
    ) -> Result<SyncWorkerHandle> {
        self.ensure_running()?;

        let settings = &self.inner.config.sync;
        let worker_config = SyncWorkerConfig {
            kinds: settings.kinds.clone(),
            retry_policy: settings.retry_policy.clone(),
            interval: interval.or(settings.background_interval),
        };
        debug!(interval = ?worker_config.interval, "Starting background sync");

        let handle = SyncWorker::spawn(Arc::clone(&self.inner.sync), worker_config);

        let mut workers = self.inner.workers.lock().await;
        workers.retain(|token| !token.is_cancelled());
        workers.push(handle.shutdown_token());

        Ok(handle)
    }

    // =========================================================================
    // Favourites
    // =========================================================================

    #[instrument(skip(self))]
    pub async fn toggle_favourite(
        &self,
        item_id: &str,
        kind: ContentKind,
    ) -> Result<FavouriteToggle> {
        self.ensure_running()?;
        let toggle = self.inner.favourites.toggle(item_id, kind).await?;

        self.emit(LibraryEvent::FavouriteToggled {
            item_id: toggle.document_id.clone(),
            kind: toggle.kind,
            is_favourite: toggle.is_favourite,
        });

        Ok(toggle)
    }

    pub async fn is_favourite(&self, item_id: &str, kind: ContentKind) -> Result<bool> {
        Ok(self.inner.favourites.is_favourite(item_id, kind).await?)
    }

    /// Favourite items of a kind, most recently favourited first
    pub async fn favourite_items(&self, kind: ContentKind) -> Result<Vec<ContentItem>> {
        Ok(self.inner.query.favourite_items(kind).await?)
    }

    pub fn watch_favourite_items(
        &self,
        kind: ContentKind,
    ) -> BoxStream<'static, Result<Vec<ContentItem>>> {
        self.inner
            .query
            .watch_favourite_items(kind)
            .map(|result| result.map_err(CoreError::from))
            .boxed()
    }

    pub async fn audit_favourites(&self, kind: ContentKind) -> Result<FavouriteAudit> {
        Ok(self.inner.favourites.audit(kind).await?)
    }

    /// Restore flag/ledger consistency for a kind
    #[instrument(skip(self))]
    pub async fn repair_favourites(&self, kind: ContentKind) -> Result<FavouriteAudit> {
        self.ensure_running()?;
        let audit = self.inner.favourites.repair(kind).await?;

        if !audit.is_consistent() {
            let repaired = (audit.flagged_without_entry.len()
                + audit.entries_without_flag.len()
                + audit.dangling_entries.len()) as u64;
            self.emit(LibraryEvent::FavouritesRepaired { kind, repaired });
        }

        Ok(audit)
    }

    // =========================================================================
    // Content
    // =========================================================================

    pub async fn all_items(&self, kind: ContentKind) -> Result<Vec<ContentItem>> {
        Ok(self.inner.query.all_items(kind).await?)
    }

    pub fn watch_all_items(&self, kind: ContentKind) -> BoxStream<'static, Result<Vec<ContentItem>>> {
        self.inner
            .query
            .watch_all_items(kind)
            .map(|result| result.map_err(CoreError::from))
            .boxed()
    }

    /// Resolve an item in the current display language
    pub async fn localized_item(&self, document_id: &str) -> Result<LocalizedContent> {
        let locale = self.inner.language.current();
        self.localized_item_in(document_id, locale).await
    }

    pub async fn localized_item_in(
        &self,
        document_id: &str,
        locale: Locale,
    ) -> Result<LocalizedContent> {
        Ok(self
            .inner
            .query
            .item_with_translation(document_id, locale.code())
            .await?)
    }

    /// Watch an item in the current display language.
    ///
    /// Re-emits when the item's kind changes in the cache and when the
    /// display language changes.
    pub fn watch_localized_item(
        &self,
        document_id: &str,
        kind: ContentKind,
    ) -> BoxStream<'static, Result<LocalizedContent>> {
        let mut language = self.inner.language.subscribe();
        let locale = *language.borrow_and_update();

        let state = LocalizedWatch {
            query: self.inner.query.clone(),
            document_id: document_id.to_string(),
            kind,
            current: self
                .inner
                .query
                .watch_item_with_translation(document_id, kind, locale.code()),
            language: Some(language),
        };

        stream::unfold(state, |mut state| async move {
            let next = state.next().await?;
            Some((next, state))
        })
        .boxed()
    }

    // =========================================================================
    // Downloads
    // =========================================================================

    /// Download an item's asset for the current display language
    pub async fn start_download(&self, document_id: &str) -> Result<DownloadHandle> {
        self.ensure_running()?;
        let locale = self.inner.language.current();
        Ok(self
            .inner
            .downloads
            .start_localized(document_id, locale)
            .await?)
    }

    pub async fn cancel_download(&self, document_id: &str) -> bool {
        self.inner.downloads.cancel(document_id).await
    }

    pub async fn is_downloading(&self, document_id: &str) -> bool {
        self.inner.downloads.is_downloading(document_id).await
    }

    /// Delete a downloaded asset and clear the item's download state.
    ///
    /// Returns `false` when the item was not downloaded.
    pub async fn remove_download(&self, document_id: &str) -> Result<bool> {
        self.ensure_running()?;
        Ok(self.inner.downloads.remove_download(document_id).await?)
    }

    // =========================================================================
    // Events and lifecycle
    // =========================================================================

    pub fn events(&self) -> EventStream {
        EventStream::new(self.inner.event_bus.subscribe())
    }

    fn emit(&self, event: LibraryEvent) {
        // No subscribers is not an error.
        let _ = self.inner.event_bus.emit(CoreEvent::Library(event));
    }

    /// Stop background work and close the cache.
    ///
    /// Stops the sync worker, cancels downloads and in-flight syncs, ends
    /// every watch stream and closes the pool. Calling it again does nothing.
    pub async fn shutdown(&self) {
        if self.inner.shut_down.swap(true, Ordering::SeqCst) {
            debug!("Core already shut down");
            return;
        }

        for token in self.inner.workers.lock().await.drain(..) {
            token.cancel();
        }
        self.inner.downloads.cancel_all().await;
        self.inner.sync.cancel_all().await;
        self.inner.db.close().await;

        info!("Content core shut down");
    }
}

fn resolve_gateway(config: &CoreConfig) -> Result<Arc<dyn RemoteContentGateway>> {
    if let Some(gateway) = &config.remote_gateway {
        return Ok(Arc::clone(gateway));
    }

    let Some(remote_store) = config.remote_store.clone() else {
        return Err(CoreError::CapabilityMissing {
            capability: "RemoteContentGateway".to_string(),
            message: "Inject a gateway or configure a remote store".to_string(),
        });
    };

    let Some(http_client) = config.http_client.clone() else {
        return Err(CoreError::CapabilityMissing {
            capability: "HttpClient".to_string(),
            message: "The document store connector needs an HTTP client; enable \
                      desktop-shims or inject one"
                .to_string(),
        });
    };

    let connector = DocStoreConnector::new(http_client, remote_store)
        .with_retry_policy(config.sync.retry_policy.clone());

    Ok(Arc::new(connector))
}

/// State of a [`CoreService::watch_localized_item`] stream
struct LocalizedWatch {
    query: ContentQueryService,
    document_id: String,
    kind: ContentKind,
    current: BoxStream<'static, core_library::Result<LocalizedContent>>,
    /// `None` once the language sender is gone
    language: Option<watch::Receiver<Locale>>,
}

enum WatchStep {
    LanguageChanged(bool),
    Item(Option<core_library::Result<LocalizedContent>>),
}

impl LocalizedWatch {
    async fn next(&mut self) -> Option<Result<LocalizedContent>> {
        loop {
            let step = {
                let language = &mut self.language;
                let current = &mut self.current;

                tokio::select! {
                    biased;
                    changed = async move {
                        match language.as_mut() {
                            Some(receiver) => receiver.changed().await.is_ok(),
                            None => std::future::pending::<bool>().await,
                        }
                    } => WatchStep::LanguageChanged(changed),
                    next = current.next() => WatchStep::Item(next),
                }
            };

            match step {
                WatchStep::Item(next) => {
                    return next.map(|result| result.map_err(CoreError::from));
                }
                WatchStep::LanguageChanged(false) => {
                    warn!("Language state dropped, locale is now fixed");
                    self.language = None;
                }
                WatchStep::LanguageChanged(true) => {
                    let Some(receiver) = self.language.as_mut() else {
                        continue;
                    };
                    let locale = *receiver.borrow_and_update();
                    debug!(locale = locale.code(), document_id = %self.document_id, "Re-localizing watched item");
                    self.current = self.query.watch_item_with_translation(
                        &self.document_id,
                        self.kind,
                        locale.code(),
                    );
                }
            }
        }
    }
}
