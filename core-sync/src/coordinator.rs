//! # Sync Coordinator
//!
//! Brings the local cache of one content kind in line with the remote store.
//!
//! ## Workflow
//!
//! 1. Claim the kind; a second concurrent call gets `SyncInProgress`
//! 2. Emit `SyncEvent::Started`
//! 3. Fetch items, translations and audio locales concurrently, under the
//!    fetch timeout and the run's cancellation token
//! 4. Open a gated write transaction and load the rows cached for the kind
//! 5. Compute the [`ReconcilePlan`](crate::reconcile::ReconcilePlan)
//! 6. Write content rows, then child rows, then prune withdrawn items if enabled
//! 7. Record the run and commit; subscribers are notified once
//! 8. Emit `SyncEvent::Completed`, or `Failed`/`Cancelled` with a failed run record
//!
//! A fetch failure stops before step 4, so the cache is never blanked by an
//! unreachable remote. Any storage error in steps 4-7 rolls the whole
//! transaction back.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use core_sync::{SyncConfig, SyncCoordinator};
//!
//! let coordinator = SyncCoordinator::new(SyncConfig::default(), db, gateway, event_bus, clock);
//! let summary = coordinator.synchronize(ContentKind::Story).await?;
//! println!("{} new stories", summary.inserted);
//! ```

use crate::{
    reconcile::{self, ExistingState, RemoteSnapshot},
    repository::{SqliteSyncRunRepository, SyncRunRepository},
    Result, SyncError, SyncRun, SyncRunId, SyncSummary,
};
use bridge_traits::{Clock, ContentKind, RemoteContentGateway};
use core_library::repositories::{
    SqliteAudioLocaleRepository, SqliteContentRepository, SqliteTranslationRepository,
};
use core_library::LibraryDatabase;
use core_runtime::config::SyncSettings;
use core_runtime::events::{CoreEvent, EventBus, SyncEvent};
use sqlx::SqliteConnection;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Sync coordinator configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// Upper bound for fetching one full snapshot
    pub fetch_timeout: Duration,

    /// Delete cached items that are missing from the snapshot
    pub prune_withdrawn: bool,

    /// Kinds covered by `synchronize_all`, in order
    pub kinds: Vec<ContentKind>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            fetch_timeout: Duration::from_secs(30),
            prune_withdrawn: false,
            kinds: ContentKind::ALL.to_vec(),
        }
    }
}

impl From<&SyncSettings> for SyncConfig {
    fn from(settings: &SyncSettings) -> Self {
        Self {
            fetch_timeout: settings.fetch_timeout,
            prune_withdrawn: settings.prune_withdrawn,
            kinds: settings.kinds.clone(),
        }
    }
}

enum SnapshotSource {
    Remote,
    Provided(RemoteSnapshot),
}

/// Sync coordinator for one cache
pub struct SyncCoordinator {
    config: SyncConfig,
    db: LibraryDatabase,
    gateway: Arc<dyn RemoteContentGateway>,
    event_bus: EventBus,
    clock: Arc<dyn Clock>,
    runs: SqliteSyncRunRepository,

    /// Cancellation tokens of the kinds currently synchronizing
    active_syncs: ActiveSyncs,
}

type ActiveSyncs = Arc<Mutex<HashMap<ContentKind, CancellationToken>>>;

fn lock_active(active_syncs: &ActiveSyncs) -> MutexGuard<'_, HashMap<ContentKind, CancellationToken>> {
    // The map holds no invariant a panicking holder could break.
    active_syncs
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Claim on a kind, released when the run finishes or its future is dropped
struct SyncClaim {
    active_syncs: ActiveSyncs,
    kind: ContentKind,
}

impl SyncClaim {
    fn acquire(active_syncs: &ActiveSyncs, kind: ContentKind) -> Result<(Self, CancellationToken)> {
        let mut active = lock_active(active_syncs);
        if active.contains_key(&kind) {
            return Err(SyncError::SyncInProgress { kind });
        }
        let token = CancellationToken::new();
        active.insert(kind, token.clone());

        let claim = Self {
            active_syncs: Arc::clone(active_syncs),
            kind,
        };
        Ok((claim, token))
    }
}

impl Drop for SyncClaim {
    fn drop(&mut self) {
        if lock_active(&self.active_syncs).remove(&self.kind).is_some() {
            debug!(kind = %self.kind, "Released sync claim");
        }
    }
}

impl SyncCoordinator {
    pub fn new(
        config: SyncConfig,
        db: LibraryDatabase,
        gateway: Arc<dyn RemoteContentGateway>,
        event_bus: EventBus,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let runs = SqliteSyncRunRepository::new(db.pool().clone());
        Self {
            config,
            db,
            gateway,
            event_bus,
            clock,
            runs,
            active_syncs: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Fetch the full remote snapshot of `kind` and apply it.
    ///
    /// # Errors
    ///
    /// - `SyncInProgress` if the kind is already synchronizing
    /// - `RemoteUnavailable` if any fetch fails or times out; nothing is written
    /// - `Cancelled` if [`cancel`](Self::cancel) is called during the fetch
    /// - `Storage` if the apply fails; the transaction is rolled back
    #[instrument(skip(self), fields(kind = %kind))]
    pub async fn synchronize(&self, kind: ContentKind) -> Result<SyncSummary> {
        self.run(kind, SnapshotSource::Remote, 1).await
    }

    /// Apply an already fetched snapshot.
    ///
    /// Follows the same rules as [`synchronize`](Self::synchronize) from the
    /// write transaction onwards.
    #[instrument(skip(self, snapshot), fields(kind = %snapshot.kind))]
    pub async fn apply_snapshot(&self, snapshot: RemoteSnapshot) -> Result<SyncSummary> {
        let kind = snapshot.kind;
        self.run(kind, SnapshotSource::Provided(snapshot), 1).await
    }

    /// Synchronize every configured kind in sequence.
    ///
    /// A failing kind does not stop the others.
    pub async fn synchronize_all(&self) -> Vec<(ContentKind, Result<SyncSummary>)> {
        let mut results = Vec::with_capacity(self.config.kinds.len());
        for &kind in &self.config.kinds {
            results.push((kind, self.synchronize(kind).await));
        }
        results
    }

    /// Cancel the in-flight fetch of `kind`.
    ///
    /// Returns false if the kind is not synchronizing. Once the apply has
    /// started the run completes regardless.
    pub async fn cancel(&self, kind: ContentKind) -> bool {
        match lock_active(&self.active_syncs).get(&kind) {
            Some(token) => {
                info!(kind = %kind, "Cancelling sync");
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancel every in-flight fetch
    pub async fn cancel_all(&self) {
        for token in lock_active(&self.active_syncs).values() {
            token.cancel();
        }
    }

    pub async fn is_syncing(&self, kind: ContentKind) -> bool {
        lock_active(&self.active_syncs).contains_key(&kind)
    }

    pub async fn last_successful_sync(&self, kind: ContentKind) -> Result<Option<SyncRun>> {
        self.runs.last_successful(kind).await
    }

    pub async fn history(&self, kind: ContentKind, limit: u32) -> Result<Vec<SyncRun>> {
        self.runs.history(kind, limit).await
    }

    /// Synchronize with an attempt number reported in `Failed` events
    pub(crate) async fn synchronize_attempt(
        &self,
        kind: ContentKind,
        attempt: u32,
    ) -> Result<SyncSummary> {
        self.run(kind, SnapshotSource::Remote, attempt).await
    }

    async fn run(
        &self,
        kind: ContentKind,
        source: SnapshotSource,
        attempt: u32,
    ) -> Result<SyncSummary> {
        let (claim, token) = SyncClaim::acquire(&self.active_syncs, kind)?;

        let run_id = SyncRunId::new();
        let started_at = self.clock.unix_timestamp_millis();
        let timer = Instant::now();

        self.event_bus
            .emit(CoreEvent::Sync(SyncEvent::Started {
                run_id: run_id.to_string(),
                kind,
            }))
            .ok();

        let outcome = async {
            let snapshot = match source {
                SnapshotSource::Remote => self.fetch(kind, &token).await?,
                SnapshotSource::Provided(snapshot) => snapshot,
            };
            self.apply(snapshot, run_id, started_at, timer).await
        }
        .await;

        drop(claim);

        match &outcome {
            Ok(summary) => {
                info!(
                    kind = %kind,
                    inserted = summary.inserted,
                    updated = summary.updated,
                    unchanged = summary.unchanged,
                    orphaned = summary.orphaned,
                    pruned = summary.pruned,
                    duration_ms = summary.duration_ms,
                    "Sync completed"
                );
                self.event_bus
                    .emit(CoreEvent::Sync(SyncEvent::Completed {
                        run_id: run_id.to_string(),
                        kind,
                        inserted: summary.inserted,
                        updated: summary.updated,
                        unchanged: summary.unchanged,
                        orphaned: summary.orphaned,
                        pruned: summary.pruned,
                        duration_ms: summary.duration_ms,
                    }))
                    .ok();
            }
            Err(error) => {
                self.record_failure(kind, run_id, error, started_at).await;

                let event = match error {
                    SyncError::Cancelled => SyncEvent::Cancelled {
                        run_id: run_id.to_string(),
                        kind,
                    },
                    _ => SyncEvent::Failed {
                        run_id: run_id.to_string(),
                        kind,
                        message: error.to_string(),
                        recoverable: error.is_retryable(),
                        attempt,
                    },
                };
                self.event_bus.emit(CoreEvent::Sync(event)).ok();
            }
        }

        outcome
    }

    async fn fetch(&self, kind: ContentKind, token: &CancellationToken) -> Result<RemoteSnapshot> {
        let gateway = &self.gateway;
        let fetch = async {
            futures::try_join!(
                gateway.fetch_content_items(kind),
                gateway.fetch_translations(kind),
                async {
                    if kind.supports_audio_locales() {
                        gateway.fetch_audio_locales(kind).await
                    } else {
                        Ok(Vec::new())
                    }
                },
            )
        };

        let (items, translations, audio_locales) = tokio::select! {
            biased;
            _ = token.cancelled() => return Err(SyncError::Cancelled),
            fetched = tokio::time::timeout(self.config.fetch_timeout, fetch) => match fetched {
                Ok(Ok(snapshot)) => snapshot,
                Ok(Err(e)) => {
                    warn!(kind = %kind, error = %e, "Remote fetch failed");
                    return Err(SyncError::RemoteUnavailable(e.to_string()));
                }
                Err(_) => {
                    warn!(kind = %kind, timeout = ?self.config.fetch_timeout, "Remote fetch timed out");
                    return Err(SyncError::RemoteUnavailable(format!(
                        "fetch timed out after {:?}",
                        self.config.fetch_timeout
                    )));
                }
            },
        };

        debug!(
            kind = %kind,
            items = items.len(),
            translations = translations.len(),
            audio_locales = audio_locales.len(),
            "Fetched remote snapshot"
        );

        Ok(RemoteSnapshot {
            kind,
            items,
            translations,
            audio_locales,
        })
    }

    async fn apply(
        &self,
        snapshot: RemoteSnapshot,
        run_id: SyncRunId,
        started_at: i64,
        timer: Instant,
    ) -> Result<SyncSummary> {
        let kind = snapshot.kind;
        let mut tx = self.db.begin_write().await?;

        let existing = load_existing(tx.conn(), kind).await?;
        let plan = reconcile::plan(&snapshot, &existing, self.config.prune_withdrawn);

        let mut pruned = 0;
        if plan.is_empty() {
            debug!(kind = %kind, unchanged = plan.unchanged, "Snapshot matches cache");
        } else {
            let conn = tx.conn();

            for item in plan.inserts.iter().chain(&plan.updates) {
                SqliteContentRepository::upsert(&mut *conn, item).await?;
            }
            for record in &plan.translation_upserts {
                SqliteTranslationRepository::upsert(&mut *conn, record).await?;
            }
            for (document_id, field) in &plan.translation_removals {
                SqliteTranslationRepository::delete(&mut *conn, document_id, *field).await?;
            }
            for variant in &plan.audio_upserts {
                SqliteAudioLocaleRepository::upsert(&mut *conn, variant).await?;
            }
            for document_id in &plan.audio_removals {
                SqliteAudioLocaleRepository::delete(&mut *conn, document_id).await?;
            }
            if plan.prunes_anything() {
                pruned = SqliteContentRepository::delete_many(&mut *conn, &plan.withdrawn).await?;
                info!(kind = %kind, pruned, "Pruned withdrawn items");
            }

            tx.mark_changed(kind);
        }

        if !plan.prune && !plan.withdrawn.is_empty() {
            debug!(kind = %kind, withdrawn = plan.withdrawn.len(), "Keeping withdrawn items");
        }

        let mut summary = SyncSummary::from_plan(kind, &plan, pruned);
        summary.duration_ms = timer.elapsed().as_millis() as u64;

        let run = SyncRun::completed(
            run_id,
            &summary,
            started_at,
            self.clock.unix_timestamp_millis(),
        );
        SqliteSyncRunRepository::insert(tx.conn(), &run).await?;

        tx.commit().await?;
        Ok(summary)
    }

    async fn record_failure(
        &self,
        kind: ContentKind,
        run_id: SyncRunId,
        error: &SyncError,
        started_at: i64,
    ) {
        let run = SyncRun::failed(
            run_id,
            kind,
            error,
            started_at,
            self.clock.unix_timestamp_millis(),
        );

        let recorded = async {
            let mut tx = self.db.begin_write().await?;
            SqliteSyncRunRepository::insert(tx.conn(), &run).await?;
            tx.commit().await?;
            Ok::<_, SyncError>(())
        }
        .await;

        if let Err(e) = recorded {
            warn!(kind = %kind, error = %e, "Failed to record failed sync run");
        }
    }
}

async fn load_existing(conn: &mut SqliteConnection, kind: ContentKind) -> Result<ExistingState> {
    let items = SqliteContentRepository::list_in(&mut *conn, kind).await?;
    let translations = SqliteTranslationRepository::list_in(&mut *conn, kind).await?;
    let audio = if kind.supports_audio_locales() {
        SqliteAudioLocaleRepository::list_in(&mut *conn, kind).await?
    } else {
        Vec::new()
    };

    let foreign_ids: BTreeSet<String> =
        sqlx::query_scalar::<_, String>("SELECT document_id FROM content_items WHERE kind != ?")
            .bind(kind.as_str())
            .fetch_all(&mut *conn)
            .await?
            .into_iter()
            .collect();

    Ok(ExistingState {
        items,
        translations,
        audio,
        foreign_ids,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::error::{BridgeError, Result as BridgeResult};
    use bridge_traits::{
        Locale, ManualClock, RemoteAudioLocale, RemoteContentItem, RemoteTranslation,
        TranslationField,
    };
    use core_library::ContentQueryService;
    use std::collections::BTreeMap;
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct StaticGateway {
        items: StdMutex<Vec<RemoteContentItem>>,
        translations: StdMutex<Vec<RemoteTranslation>>,
        audio: StdMutex<Vec<RemoteAudioLocale>>,
        fail: StdMutex<bool>,
        delay: Option<Duration>,
    }

    #[async_trait]
    impl RemoteContentGateway for StaticGateway {
        async fn fetch_content_items(
            &self,
            kind: ContentKind,
        ) -> BridgeResult<Vec<RemoteContentItem>> {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if *self.fail.lock().unwrap() {
                return Err(BridgeError::OperationFailed("HTTP 503".to_string()));
            }
            Ok(self
                .items
                .lock()
                .unwrap()
                .iter()
                .filter(|item| item.kind == kind)
                .cloned()
                .collect())
        }

        async fn fetch_translations(
            &self,
            _kind: ContentKind,
        ) -> BridgeResult<Vec<RemoteTranslation>> {
            Ok(self.translations.lock().unwrap().clone())
        }

        async fn fetch_audio_locales(
            &self,
            _kind: ContentKind,
        ) -> BridgeResult<Vec<RemoteAudioLocale>> {
            Ok(self.audio.lock().unwrap().clone())
        }
    }

    fn story(document_id: &str, local_id: i64) -> RemoteContentItem {
        RemoteContentItem {
            document_id: document_id.to_string(),
            local_id,
            kind: ContentKind::Story,
            display_name_fallback: format!("Story {}", local_id),
            asset_path: format!("stories/{}.mp3", local_id),
            image_path: format!("stories/{}.png", local_id),
            size_or_duration: "12:00".to_string(),
            popularity_count: 4,
            is_free: false,
            created_at: 1_700_000_000_000,
        }
    }

    async fn setup(gateway: Arc<StaticGateway>, config: SyncConfig) -> (LibraryDatabase, EventBus, SyncCoordinator) {
        let db = LibraryDatabase::open_in_memory().await.unwrap();
        let bus = EventBus::new(32);
        let coordinator = SyncCoordinator::new(
            config,
            db.clone(),
            gateway,
            bus.clone(),
            Arc::new(ManualClock::new(5_000)),
        );
        (db, bus, coordinator)
    }

    #[tokio::test]
    async fn test_synchronize_inserts_and_emits_events() {
        let gateway = Arc::new(StaticGateway::default());
        *gateway.items.lock().unwrap() = vec![story("s1", 1), story("s2", 2)];
        *gateway.translations.lock().unwrap() = vec![RemoteTranslation {
            id: 1,
            field: TranslationField::Name,
            texts: BTreeMap::from([(Locale::De, "Mond".to_string())]),
        }];

        let (db, bus, coordinator) = setup(gateway, SyncConfig::default()).await;
        let mut events = bus.subscribe();

        let summary = coordinator.synchronize(ContentKind::Story).await.unwrap();
        assert_eq!(summary.inserted, 2);
        assert_eq!(summary.translations_written, 1);

        assert!(matches!(
            events.recv().await.unwrap(),
            CoreEvent::Sync(SyncEvent::Started { kind: ContentKind::Story, .. })
        ));
        assert!(matches!(
            events.recv().await.unwrap(),
            CoreEvent::Sync(SyncEvent::Completed { inserted: 2, .. })
        ));

        let query = ContentQueryService::new(db);
        let localized = query.item_with_translation("s1", "de").await.unwrap();
        assert_eq!(localized.display_name, "Mond");

        let last = coordinator
            .last_successful_sync(ContentKind::Story)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(last.inserted, 2);
        assert_eq!(last.started_at, 5_000);
    }

    #[tokio::test]
    async fn test_fetch_failure_is_recorded_and_reported() {
        let gateway = Arc::new(StaticGateway::default());
        *gateway.fail.lock().unwrap() = true;

        let (_db, bus, coordinator) = setup(gateway, SyncConfig::default()).await;
        let mut events = bus.subscribe();

        let result = coordinator.synchronize(ContentKind::Track).await;
        assert!(matches!(result, Err(SyncError::RemoteUnavailable(_))));

        events.recv().await.unwrap();
        assert!(matches!(
            events.recv().await.unwrap(),
            CoreEvent::Sync(SyncEvent::Failed { recoverable: true, attempt: 1, .. })
        ));

        let history = coordinator.history(ContentKind::Track, 10).await.unwrap();
        assert_eq!(history.len(), 1);
        assert!(coordinator
            .last_successful_sync(ContentKind::Track)
            .await
            .unwrap()
            .is_none());
        assert!(!coordinator.is_syncing(ContentKind::Track).await);
    }

    #[tokio::test]
    async fn test_fetch_timeout_is_remote_unavailable() {
        let gateway = Arc::new(StaticGateway {
            delay: Some(Duration::from_millis(200)),
            ..StaticGateway::default()
        });
        let config = SyncConfig {
            fetch_timeout: Duration::from_millis(20),
            ..SyncConfig::default()
        };

        let (_db, _bus, coordinator) = setup(gateway, config).await;
        let result = coordinator.synchronize(ContentKind::Story).await;
        assert!(matches!(result, Err(SyncError::RemoteUnavailable(msg)) if msg.contains("timed out")));
    }

    #[tokio::test]
    async fn test_concurrent_sync_of_same_kind_is_rejected() {
        let gateway = Arc::new(StaticGateway {
            delay: Some(Duration::from_millis(100)),
            ..StaticGateway::default()
        });
        let (_db, _bus, coordinator) = setup(gateway, SyncConfig::default()).await;
        let coordinator = Arc::new(coordinator);

        let first = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move { coordinator.synchronize(ContentKind::Story).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        let second = coordinator.synchronize(ContentKind::Story).await;
        assert!(matches!(
            second,
            Err(SyncError::SyncInProgress { kind: ContentKind::Story })
        ));

        // Other kinds are independent.
        assert!(coordinator.synchronize(ContentKind::Track).await.is_ok());
        assert!(first.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_cancel_stops_fetch() {
        let gateway = Arc::new(StaticGateway {
            delay: Some(Duration::from_secs(5)),
            ..StaticGateway::default()
        });
        let (_db, bus, coordinator) = setup(gateway, SyncConfig::default()).await;
        let coordinator = Arc::new(coordinator);
        let mut events = bus.subscribe();

        let running = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move { coordinator.synchronize(ContentKind::Track).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(coordinator.cancel(ContentKind::Track).await);
        assert!(matches!(running.await.unwrap(), Err(SyncError::Cancelled)));
        assert!(!coordinator.cancel(ContentKind::Track).await);

        events.recv().await.unwrap();
        assert!(matches!(
            events.recv().await.unwrap(),
            CoreEvent::Sync(SyncEvent::Cancelled { kind: ContentKind::Track, .. })
        ));
    }

    #[tokio::test]
    async fn test_dropped_sync_releases_its_kind() {
        let gateway = Arc::new(StaticGateway {
            delay: Some(Duration::from_millis(100)),
            ..StaticGateway::default()
        });
        *gateway.items.lock().unwrap() = vec![RemoteContentItem {
            kind: ContentKind::Track,
            ..story("t1", 1)
        }];
        let (_db, _bus, coordinator) = setup(gateway, SyncConfig::default()).await;

        let abandoned = tokio::time::timeout(
            Duration::from_millis(20),
            coordinator.synchronize(ContentKind::Track),
        )
        .await;
        assert!(abandoned.is_err());
        assert!(!coordinator.is_syncing(ContentKind::Track).await);

        let summary = coordinator.synchronize(ContentKind::Track).await.unwrap();
        assert_eq!(summary.inserted, 1);
    }

    #[tokio::test]
    async fn test_synchronize_all_covers_configured_kinds() {
        let gateway = Arc::new(StaticGateway::default());
        *gateway.items.lock().unwrap() = vec![story("s1", 1)];

        let (_db, _bus, coordinator) = setup(gateway, SyncConfig::default()).await;
        let results = coordinator.synchronize_all().await;

        let kinds: Vec<_> = results.iter().map(|(kind, _)| *kind).collect();
        assert_eq!(kinds, vec![ContentKind::Track, ContentKind::Story]);
        assert!(results.iter().all(|(_, result)| result.is_ok()));
    }

    #[tokio::test]
    async fn test_prune_deletes_withdrawn_items() {
        let gateway = Arc::new(StaticGateway::default());
        *gateway.items.lock().unwrap() = vec![story("s1", 1), story("s2", 2)];
        let config = SyncConfig {
            prune_withdrawn: true,
            ..SyncConfig::default()
        };
        let (db, _bus, coordinator) = setup(gateway.clone(), config).await;

        coordinator.synchronize(ContentKind::Story).await.unwrap();
        gateway.items.lock().unwrap().pop();

        let summary = coordinator.synchronize(ContentKind::Story).await.unwrap();
        assert_eq!(summary.pruned, 1);

        let query = ContentQueryService::new(db);
        let ids: Vec<_> = query
            .all_items(ContentKind::Story)
            .await
            .unwrap()
            .into_iter()
            .map(|item| item.document_id)
            .collect();
        assert_eq!(ids, vec!["s1"]);
    }

    mockall::mock! {
        Gateway {}

        #[async_trait]
        impl RemoteContentGateway for Gateway {
            async fn fetch_content_items(&self, kind: ContentKind) -> BridgeResult<Vec<RemoteContentItem>>;
            async fn fetch_translations(&self, kind: ContentKind) -> BridgeResult<Vec<RemoteTranslation>>;
            async fn fetch_audio_locales(&self, kind: ContentKind) -> BridgeResult<Vec<RemoteAudioLocale>>;
        }
    }

    #[tokio::test]
    async fn test_partial_fetch_failure_writes_nothing() {
        let mut gateway = MockGateway::new();
        gateway
            .expect_fetch_content_items()
            .returning(|_| Ok(vec![story("s1", 1)]));
        gateway
            .expect_fetch_translations()
            .times(1)
            .returning(|_| Err(BridgeError::NotAvailable("connection reset".to_string())));
        gateway
            .expect_fetch_audio_locales()
            .returning(|_| Ok(Vec::new()));

        let db = LibraryDatabase::open_in_memory().await.unwrap();
        let coordinator = SyncCoordinator::new(
            SyncConfig::default(),
            db.clone(),
            Arc::new(gateway),
            EventBus::new(8),
            Arc::new(ManualClock::new(0)),
        );

        let result = coordinator.synchronize(ContentKind::Story).await;
        assert!(matches!(result, Err(SyncError::RemoteUnavailable(_))));

        let query = ContentQueryService::new(db);
        assert!(query.all_items(ContentKind::Story).await.unwrap().is_empty());
    }
}
