//! Shared fakes for the core-sync integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use bridge_traits::error::{BridgeError, Result as BridgeResult};
use bridge_traits::{
    ContentKind, DownloadTransport, DownloadUpdate, Locale, ManualClock, RemoteAudioLocale,
    RemoteContentGateway, RemoteContentItem, RemoteTranslation, TranslationField,
};
use core_library::LibraryDatabase;
use core_runtime::events::EventBus;
use core_sync::{SyncConfig, SyncCoordinator};
use futures::stream::BoxStream;
use sqlx::Row;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

// ============================================================================
// Remote gateway
// ============================================================================

/// Gateway serving whatever snapshot the test puts in it
#[derive(Default)]
pub struct FakeGateway {
    pub items: Mutex<Vec<RemoteContentItem>>,
    pub translations: Mutex<Vec<RemoteTranslation>>,
    pub audio: Mutex<Vec<RemoteAudioLocale>>,
    pub offline: Mutex<bool>,
}

impl FakeGateway {
    pub fn with_items(items: Vec<RemoteContentItem>) -> Arc<Self> {
        let gateway = Self::default();
        *gateway.items.lock().unwrap() = items;
        Arc::new(gateway)
    }

    pub fn set_items(&self, items: Vec<RemoteContentItem>) {
        *self.items.lock().unwrap() = items;
    }

    pub fn set_translations(&self, translations: Vec<RemoteTranslation>) {
        *self.translations.lock().unwrap() = translations;
    }

    pub fn set_audio(&self, audio: Vec<RemoteAudioLocale>) {
        *self.audio.lock().unwrap() = audio;
    }

    pub fn set_offline(&self, offline: bool) {
        *self.offline.lock().unwrap() = offline;
    }

    fn check_online(&self) -> BridgeResult<()> {
        if *self.offline.lock().unwrap() {
            Err(BridgeError::NotAvailable("document store unreachable".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl RemoteContentGateway for FakeGateway {
    async fn fetch_content_items(&self, kind: ContentKind) -> BridgeResult<Vec<RemoteContentItem>> {
        self.check_online()?;
        Ok(self
            .items
            .lock()
            .unwrap()
            .iter()
            .filter(|item| item.kind == kind)
            .cloned()
            .collect())
    }

    async fn fetch_translations(&self, _kind: ContentKind) -> BridgeResult<Vec<RemoteTranslation>> {
        self.check_online()?;
        Ok(self.translations.lock().unwrap().clone())
    }

    async fn fetch_audio_locales(&self, _kind: ContentKind) -> BridgeResult<Vec<RemoteAudioLocale>> {
        self.check_online()?;
        Ok(self.audio.lock().unwrap().clone())
    }
}

pub fn remote_item(document_id: &str, kind: ContentKind, local_id: i64) -> RemoteContentItem {
    RemoteContentItem {
        document_id: document_id.to_string(),
        local_id,
        kind,
        display_name_fallback: format!("Item {}", local_id),
        asset_path: format!("https://cdn.example.com/{}/{}.mp3", kind, local_id),
        image_path: format!("https://cdn.example.com/{}/{}.png", kind, local_id),
        size_or_duration: "3:30".to_string(),
        popularity_count: 10,
        is_free: true,
        created_at: 1_700_000_000_000,
    }
}

pub fn name_translation(id: i64, texts: &[(Locale, &str)]) -> RemoteTranslation {
    RemoteTranslation {
        id,
        field: TranslationField::Name,
        texts: texts
            .iter()
            .map(|(locale, text)| (*locale, text.to_string()))
            .collect::<BTreeMap<_, _>>(),
    }
}

pub fn audio_locale(id: i64, assets: &[(Locale, &str)]) -> RemoteAudioLocale {
    RemoteAudioLocale {
        id,
        assets: assets
            .iter()
            .map(|(locale, asset)| (*locale, asset.to_string()))
            .collect(),
    }
}

pub struct Harness {
    pub db: LibraryDatabase,
    pub bus: EventBus,
    pub clock: Arc<ManualClock>,
    pub coordinator: Arc<SyncCoordinator>,
}

pub async fn harness(gateway: Arc<FakeGateway>, config: SyncConfig) -> Harness {
    let db = LibraryDatabase::open_in_memory().await.unwrap();
    let bus = EventBus::new(128);
    let clock = Arc::new(ManualClock::new(1_000));
    let coordinator = Arc::new(SyncCoordinator::new(
        config,
        db.clone(),
        gateway,
        bus.clone(),
        clock.clone(),
    ));
    Harness {
        db,
        bus,
        clock,
        coordinator,
    }
}

/// Every row of the content tables, each column rendered with `quote()`.
pub async fn dump_content_tables(db: &LibraryDatabase) -> Vec<String> {
    let mut rows = Vec::new();

    for table in [
        "content_items",
        "content_translations",
        "audio_locale_variants",
        "favourite_ledger",
    ] {
        let columns: Vec<String> =
            sqlx::query_scalar("SELECT name FROM pragma_table_info(?) ORDER BY cid")
                .bind(table)
                .fetch_all(db.pool())
                .await
                .unwrap();

        let rendered = columns
            .iter()
            .map(|column| format!("quote({})", column))
            .collect::<Vec<_>>()
            .join(" || '|' || ");
        let sql = format!("SELECT {} AS row FROM {} ORDER BY rowid", rendered, table);

        for row in sqlx::query(&sql).fetch_all(db.pool()).await.unwrap() {
            rows.push(format!("{}: {}", table, row.get::<String, _>("row")));
        }
    }

    rows
}

pub async fn count_rows(db: &LibraryDatabase, table: &str, document_id: &str) -> i64 {
    let column = if table == "favourite_ledger" {
        "item_id"
    } else {
        "document_id"
    };
    let sql = format!("SELECT COUNT(*) FROM {} WHERE {} = ?", table, column);
    sqlx::query_scalar(&sql)
        .bind(document_id)
        .fetch_one(db.pool())
        .await
        .unwrap()
}

// ============================================================================
// Download transport
// ============================================================================

/// How a [`ScriptedTransport`] behaves for the next download
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Script {
    /// Write the file, report progress (with one stale value), then complete
    Complete,
    /// Report completion without writing anything
    CompleteWithoutFile,
    /// Report a failure
    Fail,
    /// Report progress, then wait for cancellation
    WaitForCancel,
    /// Write the file, wait for cancellation, then still report completion
    CompleteAfterCancel,
    /// Report a failure, then a completion that must be ignored
    FailThenComplete,
}

/// Transport that plays back a fixed script instead of doing I/O over the network
pub struct ScriptedTransport {
    script: Mutex<Script>,
    pub requested: Mutex<Vec<String>>,
}

impl ScriptedTransport {
    pub fn new(script: Script) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script),
            requested: Mutex::new(Vec::new()),
        })
    }

    pub fn set_script(&self, script: Script) {
        *self.script.lock().unwrap() = script;
    }
}

impl DownloadTransport for ScriptedTransport {
    fn download(
        &self,
        url: &str,
        destination: &Path,
        cancel: CancellationToken,
    ) -> BoxStream<'static, DownloadUpdate> {
        self.requested.lock().unwrap().push(url.to_string());

        let script = *self.script.lock().unwrap();
        let path = destination.to_path_buf();
        let (tx, rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            play(script, path, cancel, tx).await;
        });

        Box::pin(futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|update| (update, rx))
        }))
    }
}

async fn play(
    script: Script,
    path: PathBuf,
    cancel: CancellationToken,
    tx: mpsc::UnboundedSender<DownloadUpdate>,
) {
    let send = |update: DownloadUpdate| {
        let _ = tx.send(update);
    };

    send(DownloadUpdate::Started {
        total_bytes: Some(4),
    });

    match script {
        Script::Complete => {
            write_asset(&path).await;
            send(DownloadUpdate::Progress { percent: 40 });
            send(DownloadUpdate::Progress { percent: 30 });
            send(DownloadUpdate::Progress { percent: 100 });
            send(DownloadUpdate::Completed { path });
        }
        Script::CompleteWithoutFile => send(DownloadUpdate::Completed { path }),
        Script::Fail => send(DownloadUpdate::Failed {
            reason: "HTTP 404".to_string(),
        }),
        Script::WaitForCancel => {
            send(DownloadUpdate::Progress { percent: 10 });
            cancel.cancelled().await;
            send(DownloadUpdate::Cancelled);
        }
        Script::CompleteAfterCancel => {
            write_asset(&path).await;
            cancel.cancelled().await;
            send(DownloadUpdate::Completed { path });
        }
        Script::FailThenComplete => {
            write_asset(&path).await;
            send(DownloadUpdate::Failed {
                reason: "checksum mismatch".to_string(),
            });
            send(DownloadUpdate::Completed { path });
        }
    }
}

async fn write_asset(path: &Path) {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await.unwrap();
    }
    tokio::fs::write(path, b"ID3\x04").await.unwrap();
}
