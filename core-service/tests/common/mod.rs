//! Fakes and builders shared by the core-service integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use bridge_traits::error::{BridgeError, Result as BridgeResult};
use bridge_traits::{
    ContentKind, DownloadTransport, DownloadUpdate, Locale, ManualClock, RemoteAudioLocale,
    RemoteContentGateway, RemoteContentItem, RemoteTranslation, TranslationField,
};
use core_runtime::config::{CoreConfig, SyncSettings};
use core_service::CoreService;
use futures::stream::{self, BoxStream, StreamExt};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

/// Gateway serving a snapshot the test can change between syncs
#[derive(Default)]
pub struct FakeGateway {
    items: Mutex<Vec<RemoteContentItem>>,
    translations: Mutex<Vec<RemoteTranslation>>,
    audio: Mutex<Vec<RemoteAudioLocale>>,
    offline: Mutex<bool>,
}

impl FakeGateway {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
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

    fn online(&self) -> BridgeResult<()> {
        if *self.offline.lock().unwrap() {
            Err(BridgeError::NotAvailable("offline".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl RemoteContentGateway for FakeGateway {
    async fn fetch_content_items(&self, kind: ContentKind) -> BridgeResult<Vec<RemoteContentItem>> {
        self.online()?;
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
        self.online()?;
        Ok(self.translations.lock().unwrap().clone())
    }

    async fn fetch_audio_locales(&self, kind: ContentKind) -> BridgeResult<Vec<RemoteAudioLocale>> {
        self.online()?;
        if kind.supports_audio_locales() {
            Ok(self.audio.lock().unwrap().clone())
        } else {
            Ok(Vec::new())
        }
    }
}

/// Transport that writes a small file and completes, recording each url
#[derive(Default)]
pub struct InstantTransport {
    pub requested: Mutex<Vec<String>>,
}

impl DownloadTransport for InstantTransport {
    fn download(
        &self,
        url: &str,
        destination: &Path,
        cancel: CancellationToken,
    ) -> BoxStream<'static, DownloadUpdate> {
        self.requested.lock().unwrap().push(url.to_string());
        let destination = destination.to_path_buf();

        stream::once(async move {
            if cancel.is_cancelled() {
                return DownloadUpdate::Cancelled;
            }
            if let Some(parent) = destination.parent() {
                tokio::fs::create_dir_all(parent).await.unwrap();
            }
            tokio::fs::write(&destination, b"audio").await.unwrap();
            DownloadUpdate::Completed { path: destination }
        })
        .boxed()
    }
}

pub fn remote_item(document_id: &str, kind: ContentKind, local_id: i64) -> RemoteContentItem {
    RemoteContentItem {
        document_id: document_id.to_string(),
        local_id,
        kind,
        display_name_fallback: format!("Fallback {}", local_id),
        asset_path: format!("https://cdn.example.com/{}/{}.mp3", kind, local_id),
        image_path: format!("https://cdn.example.com/{}/{}.png", kind, local_id),
        size_or_duration: "5:00".to_string(),
        popularity_count: 1,
        is_free: true,
        created_at: 1_700_000_000_000,
    }
}

pub fn translation(id: i64, field: TranslationField, texts: &[(Locale, &str)]) -> RemoteTranslation {
    RemoteTranslation {
        id,
        field,
        texts: texts
            .iter()
            .map(|(locale, text)| (*locale, text.to_string()))
            .collect::<BTreeMap<_, _>>(),
    }
}

pub struct TestCore {
    pub core: CoreService,
    pub gateway: Arc<FakeGateway>,
    pub transport: Arc<InstantTransport>,
    pub clock: Arc<ManualClock>,
    pub dir: TempDir,
}

pub async fn test_core(gateway: Arc<FakeGateway>) -> TestCore {
    test_core_with(gateway, SyncSettings::default()).await
}

pub async fn test_core_with(gateway: Arc<FakeGateway>, settings: SyncSettings) -> TestCore {
    let dir = tempfile::tempdir().unwrap();
    let transport = Arc::new(InstantTransport::default());
    let clock = Arc::new(ManualClock::new(1_000));

    let config = CoreConfig::builder()
        .database_path(":memory:")
        .download_dir(dir.path().join("assets"))
        .remote_gateway(gateway.clone())
        .download_transport(transport.clone())
        .clock(clock.clone())
        .sync_settings(settings)
        .event_buffer_size(64)
        .build()
        .unwrap();

    let core = CoreService::bootstrap(config).await.unwrap();

    TestCore {
        core,
        gateway,
        transport,
        clock,
        dir,
    }
}

/// Five tracks and three stories, already synchronized
pub async fn synced_core() -> TestCore {
    let gateway = FakeGateway::new();
    let mut items: Vec<_> = (1..=5)
        .map(|n| remote_item(&format!("t{}", n), ContentKind::Track, n))
        .collect();
    items.extend((1..=3).map(|n| remote_item(&format!("s{}", n), ContentKind::Story, 100 + n)));
    gateway.set_items(items);

    let test = test_core(gateway).await;
    for (kind, result) in test.core.sync_all().await {
        result.unwrap_or_else(|e| panic!("sync of {} failed: {}", kind, e));
    }
    test
}
