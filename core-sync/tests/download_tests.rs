//! Download state machine and persistence against a scripted transport.

mod common;

use bridge_traits::{ContentKind, Locale};
use common::{audio_locale, harness, remote_item, FakeGateway, Harness, Script, ScriptedTransport};
use core_library::repositories::{ContentRepository, SqliteContentRepository};
use core_library::ContentItem;
use core_runtime::events::{CoreEvent, DownloadEvent, LibraryEvent};
use core_sync::{DownloadCoordinator, DownloadState, SyncConfig, SyncError};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

struct DownloadFixture {
    h: Harness,
    transport: Arc<ScriptedTransport>,
    downloads: DownloadCoordinator,
    _dir: TempDir,
}

async fn fixture(script: Script) -> DownloadFixture {
    let gateway = FakeGateway::with_items(vec![
        remote_item("t1", ContentKind::Track, 1),
        remote_item("s1", ContentKind::Story, 1),
    ]);
    gateway.set_audio(vec![audio_locale(
        1,
        &[
            (Locale::En, "https://cdn.example.com/story/1.en.mp3"),
            (Locale::Fr, "https://cdn.example.com/story/1.fr.m4a"),
        ],
    )]);

    let h = harness(gateway, SyncConfig::default()).await;
    h.coordinator.synchronize(ContentKind::Track).await.unwrap();
    h.coordinator.synchronize(ContentKind::Story).await.unwrap();

    let dir = tempfile::tempdir().unwrap();
    let transport = ScriptedTransport::new(script);
    let downloads = DownloadCoordinator::new(
        h.db.clone(),
        transport.clone(),
        h.bus.clone(),
        dir.path().to_path_buf(),
    );

    DownloadFixture {
        h,
        transport,
        downloads,
        _dir: dir,
    }
}

async fn item(f: &DownloadFixture, document_id: &str) -> ContentItem {
    SqliteContentRepository::new(f.h.db.pool().clone())
        .find_by_id(document_id)
        .await
        .unwrap()
        .unwrap()
}

#[tokio::test]
async fn test_completed_download_marks_item_after_file_exists() {
    let f = fixture(Script::Complete).await;
    let mut events = f.h.bus.subscribe();

    let handle = f.downloads.start("t1").await.unwrap();
    let state = handle.wait().await;

    let DownloadState::Completed(path) = state else {
        panic!("expected completion, got {:?}", state);
    };
    assert!(path.exists());
    assert!(path.ends_with("track/t1.mp3"));

    let t1 = item(&f, "t1").await;
    assert!(t1.is_downloaded);
    assert_eq!(t1.local_asset_path.as_deref(), Some(path.to_string_lossy().as_ref()));

    let mut percents = Vec::new();
    loop {
        let event = tokio::time::timeout(Duration::from_secs(1), events.recv())
            .await
            .expect("completion event")
            .unwrap();
        match event {
            CoreEvent::Download(DownloadEvent::Progress { percent, .. }) => percents.push(percent),
            CoreEvent::Download(DownloadEvent::Completed { document_id, .. }) => {
                assert_eq!(document_id, "t1");
                break;
            }
            _ => {}
        }
    }
    assert_eq!(percents, vec![40, 100]);
}

#[tokio::test]
async fn test_completion_without_file_fails() {
    let f = fixture(Script::CompleteWithoutFile).await;

    let state = f.downloads.start("t1").await.unwrap().wait().await;

    assert!(matches!(state, DownloadState::Failed(reason) if reason.contains("missing")));
    let t1 = item(&f, "t1").await;
    assert!(!t1.is_downloaded);
    assert!(t1.local_asset_path.is_none());
}

#[tokio::test]
async fn test_failed_download_leaves_row_unchanged() {
    let f = fixture(Script::Fail).await;
    let before = item(&f, "t1").await;

    let state = f.downloads.start("t1").await.unwrap().wait().await;

    assert_eq!(state, DownloadState::Failed("HTTP 404".to_string()));
    assert_eq!(item(&f, "t1").await, before);
}

#[tokio::test]
async fn test_cancelled_download_leaves_row_unchanged() {
    let f = fixture(Script::WaitForCancel).await;
    let before = item(&f, "t1").await;

    let handle = f.downloads.start("t1").await.unwrap();
    let mut watch = handle.watch();
    watch
        .wait_for(|state| matches!(state, DownloadState::Progress(10)))
        .await
        .unwrap();

    assert!(f.downloads.cancel("t1").await);
    assert_eq!(handle.wait().await, DownloadState::Cancelled);
    assert_eq!(item(&f, "t1").await, before);
}

#[tokio::test]
async fn test_cancellation_wins_over_late_completion() {
    let f = fixture(Script::CompleteAfterCancel).await;

    let handle = f.downloads.start("t1").await.unwrap();
    let destination = f.downloads.destination_for(&item(&f, "t1").await, "t1.mp3");

    // Wait for the transport to finish writing before cancelling.
    for _ in 0..100 {
        if destination.exists() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert!(destination.exists());

    handle.cancel();
    assert_eq!(handle.wait().await, DownloadState::Cancelled);

    assert!(!destination.exists());
    assert!(!item(&f, "t1").await.is_downloaded);
}

#[tokio::test]
async fn test_terminal_state_is_never_left() {
    let f = fixture(Script::FailThenComplete).await;

    let handle = f.downloads.start("t1").await.unwrap();
    let mut watch = handle.watch();
    let state = handle.wait().await;
    assert_eq!(state, DownloadState::Failed("checksum mismatch".to_string()));

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(*watch.borrow_and_update(), state);
    assert!(!item(&f, "t1").await.is_downloaded);
}

#[tokio::test]
async fn test_second_download_of_same_item_is_rejected() {
    let f = fixture(Script::WaitForCancel).await;

    let first = f.downloads.start("t1").await.unwrap();
    let second = f.downloads.start("t1").await;
    assert!(matches!(
        second,
        Err(SyncError::DownloadInProgress { document_id }) if document_id == "t1"
    ));

    // Other items are independent.
    let other = f.downloads.start("s1").await.unwrap();
    other.cancel();
    first.cancel();
    assert_eq!(first.wait().await, DownloadState::Cancelled);
    assert_eq!(other.wait().await, DownloadState::Cancelled);
}

#[tokio::test]
async fn test_unknown_item_is_not_found() {
    let f = fixture(Script::Complete).await;

    let result = f.downloads.start("missing").await;
    assert!(matches!(result, Err(SyncError::NotFound { .. })));
    assert!(f.transport.requested.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_localized_download_uses_locale_variant() {
    let f = fixture(Script::Complete).await;

    let state = f
        .downloads
        .start_localized("s1", Locale::Fr)
        .await
        .unwrap()
        .wait()
        .await;
    let DownloadState::Completed(path) = state else {
        panic!("expected completion, got {:?}", state);
    };
    assert!(path.ends_with("story/s1.m4a"));

    f.downloads.remove_download("s1").await.unwrap();
    f.downloads
        .start_localized("s1", Locale::Tr)
        .await
        .unwrap()
        .wait()
        .await;

    let requested = f.transport.requested.lock().unwrap().clone();
    assert_eq!(
        requested,
        vec![
            "https://cdn.example.com/story/1.fr.m4a".to_string(),
            "https://cdn.example.com/story/1.en.mp3".to_string(),
        ]
    );
}

#[tokio::test]
async fn test_remove_download_clears_row_and_file() {
    let f = fixture(Script::Complete).await;

    let DownloadState::Completed(path) = f.downloads.start("t1").await.unwrap().wait().await else {
        panic!("download did not complete");
    };
    let mut events = f.h.bus.subscribe();

    assert!(f.downloads.remove_download("t1").await.unwrap());
    assert!(!path.exists());

    let t1 = item(&f, "t1").await;
    assert!(!t1.is_downloaded);
    assert!(t1.local_asset_path.is_none());
    let removed = loop {
        match events.recv().await.unwrap() {
            CoreEvent::Library(LibraryEvent::DownloadRemoved { document_id }) => break document_id,
            _ => continue,
        }
    };
    assert_eq!(removed, "t1");

    // Nothing left to remove.
    assert!(!f.downloads.remove_download("t1").await.unwrap());
}
