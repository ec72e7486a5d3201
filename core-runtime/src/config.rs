//! # Core Configuration Module
//!
//! Provides configuration management for the content core.
//!
//! ## Overview
//!
//! The configuration system uses a builder pattern to construct a `CoreConfig`
//! instance that holds all collaborators and settings required by the core.
//! It enforces fail-fast validation so a misconfigured host fails at startup
//! rather than on its first sync.
//!
//! ## Collaborators
//!
//! - `RemoteContentGateway` - Source of content snapshots. Either inject one,
//!   or provide a [`RemoteStoreConfig`] and an `HttpClient` so the service can
//!   build the document-store connector.
//! - `HttpClient` - HTTP operations (desktop default: reqwest)
//! - `DownloadTransport` - Asset downloads (desktop default: reqwest byte stream)
//! - `Clock` - Time source for favourite timestamps (default: system clock)
//!
//! When the `desktop-shims` feature is enabled, desktop-ready defaults for
//! `HttpClient` and `DownloadTransport` are injected automatically if not provided.
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::{CoreConfig, RemoteStoreConfig};
//!
//! let config = CoreConfig::builder()
//!     .database_path("/data/nightlight/content.db")
//!     .download_dir("/data/nightlight/downloads")
//!     .remote_store(RemoteStoreConfig::new("nightlight-prod").with_api_key("AIza..."))
//!     .build()?;
//! ```
//!
//! ### In-memory store for tests
//!
//! ```ignore
//! let config = CoreConfig::builder()
//!     .database_path(":memory:")
//!     .download_dir(temp_dir.path())
//!     .remote_gateway(Arc::new(FakeGateway::default()))
//!     .download_transport(Arc::new(FakeTransport::default()))
//!     .build()?;
//! ```

use crate::error::{Error, Result};
use crate::events::DEFAULT_EVENT_BUFFER_SIZE;
use bridge_traits::{
    Clock, ContentKind, DownloadTransport, HttpClient, Locale, RemoteContentGateway, RetryPolicy,
    SystemClock,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_DOCSTORE_BASE_URL: &str = "https://firestore.googleapis.com/v1";
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_PAGE_SIZE: u32 = 300;

/// Core configuration for the content core.
///
/// Use [`CoreConfigBuilder`] to construct instances.
#[derive(Clone)]
pub struct CoreConfig {
    /// Path to the SQLite database file, or `:memory:`
    pub database_path: PathBuf,

    /// Root directory for downloaded assets
    pub download_dir: PathBuf,

    /// Locale used until the host sets one
    pub default_locale: Locale,

    pub sync: SyncSettings,

    /// Document store to build the default gateway from
    pub remote_store: Option<RemoteStoreConfig>,

    /// Injected gateway; takes precedence over `remote_store`
    pub remote_gateway: Option<Arc<dyn RemoteContentGateway>>,

    pub http_client: Option<Arc<dyn HttpClient>>,

    pub download_transport: Arc<dyn DownloadTransport>,

    pub clock: Arc<dyn Clock>,

    /// Capacity of the event bus and change notification channels
    pub event_buffer_size: usize,
}

impl std::fmt::Debug for CoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreConfig")
            .field("database_path", &self.database_path)
            .field("download_dir", &self.download_dir)
            .field("default_locale", &self.default_locale)
            .field("sync", &self.sync)
            .field("remote_store", &self.remote_store)
            .field(
                "remote_gateway",
                &self
                    .remote_gateway
                    .as_ref()
                    .map(|_| "RemoteContentGateway { ... }"),
            )
            .field(
                "http_client",
                &self.http_client.as_ref().map(|_| "HttpClient { ... }"),
            )
            .field("download_transport", &"DownloadTransport { ... }")
            .field("event_buffer_size", &self.event_buffer_size)
            .finish()
    }
}

impl CoreConfig {
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    /// Whether the database lives in memory only
    pub fn is_in_memory(&self) -> bool {
        self.database_path.as_os_str() == ":memory:"
    }

    /// Validates the configuration and returns an error if invalid.
    ///
    /// This checks:
    /// - Paths are not empty
    /// - The event buffer holds at least one event
    /// - A gateway can be resolved
    /// - Sync and remote store settings are well-formed
    pub fn validate(&self) -> Result<()> {
        if self.database_path.as_os_str().is_empty() {
            return Err(Error::Config("Database path cannot be empty".to_string()));
        }

        if self.download_dir.as_os_str().is_empty() {
            return Err(Error::Config(
                "Download directory cannot be empty".to_string(),
            ));
        }

        if self.event_buffer_size == 0 {
            return Err(Error::Config(
                "Event buffer size must be greater than 0".to_string(),
            ));
        }

        self.sync.validate()?;

        if self.remote_gateway.is_none() {
            let Some(remote_store) = &self.remote_store else {
                return Err(Error::CapabilityMissing {
                    capability: "RemoteContentGateway".to_string(),
                    message: "Inject a RemoteContentGateway or configure a remote store \
                              with .remote_store() so the default connector can be built."
                        .to_string(),
                });
            };

            remote_store.validate()?;

            if self.http_client.is_none() {
                return Err(http_client_missing_error());
            }
        }

        Ok(())
    }
}

// =============================================================================
// Sync Settings
// =============================================================================

/// Synchronization behaviour
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSettings {
    /// Backoff used by the background worker between failed attempts
    pub retry_policy: RetryPolicy,
    /// Upper bound for fetching one full snapshot
    pub fetch_timeout: Duration,
    /// Delete cached items that disappeared from the remote snapshot
    pub prune_withdrawn: bool,
    /// Kinds synchronized by `sync_all` and the background worker
    pub kinds: Vec<ContentKind>,
    /// Interval of the background worker; `None` runs it once
    pub background_interval: Option<Duration>,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            retry_policy: RetryPolicy::default(),
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            prune_withdrawn: false,
            kinds: ContentKind::ALL.to_vec(),
            background_interval: None,
        }
    }
}

impl SyncSettings {
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    pub fn with_prune_withdrawn(mut self, prune: bool) -> Self {
        self.prune_withdrawn = prune;
        self
    }

    pub fn with_kinds(mut self, kinds: impl IntoIterator<Item = ContentKind>) -> Self {
        self.kinds = kinds.into_iter().collect();
        self
    }

    pub fn with_background_interval(mut self, interval: Option<Duration>) -> Self {
        self.background_interval = interval;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.kinds.is_empty() {
            return Err(Error::Config(
                "At least one content kind must be synchronized".to_string(),
            ));
        }

        if self.fetch_timeout.is_zero() {
            return Err(Error::Config(
                "Fetch timeout must be greater than 0".to_string(),
            ));
        }

        if self.retry_policy.max_attempts == 0 {
            return Err(Error::Config(
                "Retry policy needs at least one attempt".to_string(),
            ));
        }

        if self.retry_policy.base_delay > self.retry_policy.max_delay {
            return Err(Error::Config(format!(
                "Retry base delay ({:?}) exceeds max delay ({:?})",
                self.retry_policy.base_delay, self.retry_policy.max_delay
            )));
        }

        if matches!(self.background_interval, Some(interval) if interval.is_zero()) {
            return Err(Error::Config(
                "Background sync interval must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

// =============================================================================
// Remote Store
// =============================================================================

/// Collection names in the remote document store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionNames {
    pub tracks: String,
    pub track_translations: String,
    pub stories: String,
    pub story_translations: String,
    pub story_audio: String,
}

impl Default for CollectionNames {
    fn default() -> Self {
        Self {
            tracks: "lullabies".to_string(),
            track_translations: "lullaby_translations".to_string(),
            stories: "stories".to_string(),
            story_translations: "story_translations".to_string(),
            story_audio: "story_audio".to_string(),
        }
    }
}

impl CollectionNames {
    fn all(&self) -> [&str; 5] {
        [
            &self.tracks,
            &self.track_translations,
            &self.stories,
            &self.story_translations,
            &self.story_audio,
        ]
    }
}

/// Location and credentials of the remote document store
#[derive(Clone, PartialEq, Eq)]
pub struct RemoteStoreConfig {
    /// REST root, e.g. `https://firestore.googleapis.com/v1`
    pub base_url: String,
    pub project_id: String,
    pub database_id: String,
    pub api_key: Option<String>,
    /// Documents requested per list call
    pub page_size: u32,
    pub collections: CollectionNames,
}

impl RemoteStoreConfig {
    pub fn new(project_id: impl Into<String>) -> Self {
        Self {
            base_url: DEFAULT_DOCSTORE_BASE_URL.to_string(),
            project_id: project_id.into(),
            database_id: "(default)".to_string(),
            api_key: None,
            page_size: DEFAULT_PAGE_SIZE,
            collections: CollectionNames::default(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_database_id(mut self, database_id: impl Into<String>) -> Self {
        self.database_id = database_id.into();
        self
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn with_collections(mut self, collections: CollectionNames) -> Self {
        self.collections = collections;
        self
    }

    /// Collection holding the items of a kind
    pub fn items_collection(&self, kind: ContentKind) -> &str {
        match kind {
            ContentKind::Track => &self.collections.tracks,
            ContentKind::Story => &self.collections.stories,
        }
    }

    pub fn translations_collection(&self, kind: ContentKind) -> &str {
        match kind {
            ContentKind::Track => &self.collections.track_translations,
            ContentKind::Story => &self.collections.story_translations,
        }
    }

    /// Only stories have localized audio
    pub fn audio_collection(&self, kind: ContentKind) -> Option<&str> {
        match kind {
            ContentKind::Track => None,
            ContentKind::Story => Some(&self.collections.story_audio),
        }
    }

    /// List endpoint of a collection
    pub fn documents_url(&self, collection: &str) -> String {
        format!(
            "{}/projects/{}/databases/{}/documents/{}",
            self.base_url.trim_end_matches('/'),
            self.project_id,
            self.database_id,
            collection
        )
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.base_url.starts_with("https://") || self.base_url.starts_with("http://")) {
            return Err(Error::Config(format!(
                "Remote store base URL must use http(s): {}",
                self.base_url
            )));
        }

        if self.project_id.trim().is_empty() {
            return Err(Error::Config(
                "Remote store project id cannot be empty".to_string(),
            ));
        }

        if self.database_id.trim().is_empty() {
            return Err(Error::Config(
                "Remote store database id cannot be empty".to_string(),
            ));
        }

        if self.page_size == 0 {
            return Err(Error::Config(
                "Remote store page size must be greater than 0".to_string(),
            ));
        }

        if let Some(name) = self
            .collections
            .all()
            .into_iter()
            .find(|name| name.trim().is_empty() || name.contains('/'))
        {
            return Err(Error::Config(format!(
                "Invalid collection name '{}'",
                name
            )));
        }

        Ok(())
    }
}

impl std::fmt::Debug for RemoteStoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteStoreConfig")
            .field("base_url", &self.base_url)
            .field("project_id", &self.project_id)
            .field("database_id", &self.database_id)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("page_size", &self.page_size)
            .field("collections", &self.collections)
            .finish()
    }
}

// =============================================================================
// Platform defaults
// =============================================================================

fn http_client_missing_error() -> Error {
    Error::CapabilityMissing {
        capability: "HttpClient".to_string(),
        message: "An HttpClient is required to reach the remote store. \
                  Desktop: enable the 'desktop-shims' feature to use the default reqwest client. \
                  Other hosts: inject a platform HTTP client."
            .to_string(),
    }
}

#[cfg(feature = "desktop-shims")]
fn provide_default_http_client() -> Result<Option<Arc<dyn HttpClient>>> {
    use bridge_desktop::ReqwestHttpClient;

    let client = ReqwestHttpClient::new()
        .map_err(|e| Error::Internal(format!("Failed to build default HttpClient: {}", e)))?;
    let client: Arc<dyn HttpClient> = Arc::new(client);
    Ok(Some(client))
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_http_client() -> Result<Option<Arc<dyn HttpClient>>> {
    Ok(None)
}

#[cfg(feature = "desktop-shims")]
fn provide_default_download_transport() -> Result<Arc<dyn DownloadTransport>> {
    use bridge_desktop::HttpDownloadTransport;

    let transport = HttpDownloadTransport::new().map_err(|e| {
        Error::Internal(format!("Failed to build default DownloadTransport: {}", e))
    })?;
    let transport: Arc<dyn DownloadTransport> = Arc::new(transport);
    Ok(transport)
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_download_transport() -> Result<Arc<dyn DownloadTransport>> {
    Err(Error::CapabilityMissing {
        capability: "DownloadTransport".to_string(),
        message: "A DownloadTransport is required for asset downloads. \
                  Desktop: enable the 'desktop-shims' feature to use the default HTTP transport. \
                  Other hosts: inject a platform download transport."
            .to_string(),
    })
}

// =============================================================================
// Builder
// =============================================================================

/// Builder for constructing [`CoreConfig`] instances.
#[derive(Default)]
pub struct CoreConfigBuilder {
    database_path: Option<PathBuf>,
    download_dir: Option<PathBuf>,
    default_locale: Option<Locale>,
    sync: Option<SyncSettings>,
    remote_store: Option<RemoteStoreConfig>,
    remote_gateway: Option<Arc<dyn RemoteContentGateway>>,
    http_client: Option<Arc<dyn HttpClient>>,
    download_transport: Option<Arc<dyn DownloadTransport>>,
    clock: Option<Arc<dyn Clock>>,
    event_buffer_size: Option<usize>,
}

impl CoreConfigBuilder {
    /// Path to the SQLite database; `:memory:` selects an in-memory store
    pub fn database_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.database_path = Some(path.into());
        self
    }

    pub fn download_dir<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.download_dir = Some(path.into());
        self
    }

    pub fn default_locale(mut self, locale: Locale) -> Self {
        self.default_locale = Some(locale);
        self
    }

    pub fn sync_settings(mut self, settings: SyncSettings) -> Self {
        self.sync = Some(settings);
        self
    }

    pub fn remote_store(mut self, config: RemoteStoreConfig) -> Self {
        self.remote_store = Some(config);
        self
    }

    pub fn remote_gateway(mut self, gateway: Arc<dyn RemoteContentGateway>) -> Self {
        self.remote_gateway = Some(gateway);
        self
    }

    pub fn http_client(mut self, client: Arc<dyn HttpClient>) -> Self {
        self.http_client = Some(client);
        self
    }

    pub fn download_transport(mut self, transport: Arc<dyn DownloadTransport>) -> Self {
        self.download_transport = Some(transport);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn event_buffer_size(mut self, size: usize) -> Self {
        self.event_buffer_size = Some(size);
        self
    }

    /// Builds the final `CoreConfig` instance.
    ///
    /// Missing platform collaborators are filled from the desktop defaults
    /// when available; otherwise an actionable `CapabilityMissing` error is
    /// returned.
    pub fn build(self) -> Result<CoreConfig> {
        let database_path = self.database_path.ok_or_else(|| {
            Error::Config("Database path is required. Use .database_path() to set it.".to_string())
        })?;

        let download_dir = self.download_dir.ok_or_else(|| {
            Error::Config(
                "Download directory is required. Use .download_dir() to set it.".to_string(),
            )
        })?;

        // The default client is only worth building when the connector needs it.
        let http_client = match self.http_client {
            Some(client) => Some(client),
            None if self.remote_gateway.is_none() && self.remote_store.is_some() => {
                provide_default_http_client()?
            }
            None => None,
        };

        let download_transport = match self.download_transport {
            Some(transport) => transport,
            None => provide_default_download_transport()?,
        };

        let config = CoreConfig {
            database_path,
            download_dir,
            default_locale: self.default_locale.unwrap_or_default(),
            sync: self.sync.unwrap_or_default(),
            remote_store: self.remote_store,
            remote_gateway: self.remote_gateway,
            http_client,
            download_transport,
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            event_buffer_size: self.event_buffer_size.unwrap_or(DEFAULT_EVENT_BUFFER_SIZE),
        };

        config.validate()?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::error::Result as BridgeResult;
    use bridge_traits::{DownloadUpdate, RemoteContentItem, RemoteTranslation};
    use futures::stream::{self, BoxStream, StreamExt};
    use std::path::Path;
    use tokio_util::sync::CancellationToken;

    struct EmptyGateway;

    #[async_trait]
    impl RemoteContentGateway for EmptyGateway {
        async fn fetch_content_items(
            &self,
            _kind: ContentKind,
        ) -> BridgeResult<Vec<RemoteContentItem>> {
            Ok(Vec::new())
        }

        async fn fetch_translations(
            &self,
            _kind: ContentKind,
        ) -> BridgeResult<Vec<RemoteTranslation>> {
            Ok(Vec::new())
        }
    }

    struct NoopTransport;

    impl DownloadTransport for NoopTransport {
        fn download(
            &self,
            _url: &str,
            _destination: &Path,
            _cancel: CancellationToken,
        ) -> BoxStream<'static, DownloadUpdate> {
            stream::iter(vec![DownloadUpdate::Cancelled]).boxed()
        }
    }

    fn base_builder() -> CoreConfigBuilder {
        CoreConfig::builder()
            .database_path(":memory:")
            .download_dir("/tmp/nightlight-downloads")
            .remote_gateway(Arc::new(EmptyGateway))
            .download_transport(Arc::new(NoopTransport))
    }

    #[test]
    fn test_builder_with_injected_collaborators() {
        let config = base_builder()
            .default_locale(Locale::De)
            .event_buffer_size(16)
            .build()
            .unwrap();

        assert!(config.is_in_memory());
        assert_eq!(config.default_locale, Locale::De);
        assert_eq!(config.event_buffer_size, 16);
        assert!(!config.sync.prune_withdrawn);
        assert_eq!(config.sync.kinds, ContentKind::ALL.to_vec());
    }

    #[test]
    fn test_builder_requires_database_path() {
        let result = CoreConfig::builder()
            .download_dir("/tmp/downloads")
            .remote_gateway(Arc::new(EmptyGateway))
            .download_transport(Arc::new(NoopTransport))
            .build();

        assert!(matches!(result, Err(Error::Config(msg)) if msg.contains("Database path")));
    }

    #[test]
    fn test_builder_requires_gateway_or_remote_store() {
        let result = CoreConfig::builder()
            .database_path(":memory:")
            .download_dir("/tmp/downloads")
            .download_transport(Arc::new(NoopTransport))
            .build();

        assert!(matches!(
            result,
            Err(Error::CapabilityMissing { capability, .. }) if capability == "RemoteContentGateway"
        ));
    }

    #[test]
    fn test_rejects_zero_event_buffer() {
        let result = base_builder().event_buffer_size(0).build();
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_sync_settings_validation() {
        assert!(SyncSettings::default().validate().is_ok());
        assert!(SyncSettings::default().with_kinds([]).validate().is_err());
        assert!(SyncSettings::default()
            .with_fetch_timeout(Duration::ZERO)
            .validate()
            .is_err());

        let inverted = RetryPolicy {
            base_delay: Duration::from_secs(10),
            max_delay: Duration::from_secs(1),
            ..RetryPolicy::default()
        };
        assert!(SyncSettings::default()
            .with_retry_policy(inverted)
            .validate()
            .is_err());

        let result = base_builder()
            .sync_settings(SyncSettings::default().with_background_interval(Some(Duration::ZERO)))
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_remote_store_urls() {
        let store = RemoteStoreConfig::new("nightlight").with_base_url("https://store.example/v1/");

        assert_eq!(store.items_collection(ContentKind::Track), "lullabies");
        assert_eq!(
            store.translations_collection(ContentKind::Story),
            "story_translations"
        );
        assert_eq!(store.audio_collection(ContentKind::Track), None);
        assert_eq!(
            store.documents_url("stories"),
            "https://store.example/v1/projects/nightlight/databases/(default)/documents/stories"
        );
    }

    #[test]
    fn test_remote_store_validation() {
        assert!(RemoteStoreConfig::new("nightlight").validate().is_ok());
        assert!(RemoteStoreConfig::new(" ").validate().is_err());
        assert!(RemoteStoreConfig::new("p")
            .with_base_url("ftp://store")
            .validate()
            .is_err());
        assert!(RemoteStoreConfig::new("p").with_page_size(0).validate().is_err());

        let collections = CollectionNames {
            stories: "a/b".to_string(),
            ..CollectionNames::default()
        };
        assert!(RemoteStoreConfig::new("p")
            .with_collections(collections)
            .validate()
            .is_err());
    }

    #[test]
    fn test_debug_redacts_api_key() {
        let store = RemoteStoreConfig::new("nightlight").with_api_key("AIza-secret");
        let rendered = format!("{:?}", store);
        assert!(!rendered.contains("AIza-secret"));
        assert!(rendered.contains("[REDACTED]"));
    }

    #[cfg(not(feature = "desktop-shims"))]
    #[test]
    fn test_remote_store_without_http_client() {
        let result = CoreConfig::builder()
            .database_path(":memory:")
            .download_dir("/tmp/downloads")
            .remote_store(RemoteStoreConfig::new("nightlight"))
            .download_transport(Arc::new(NoopTransport))
            .build();

        assert!(matches!(
            result,
            Err(Error::CapabilityMissing { capability, .. }) if capability == "HttpClient"
        ));
    }

    #[cfg(not(feature = "desktop-shims"))]
    #[test]
    fn test_transport_required_without_desktop_defaults() {
        let result = CoreConfig::builder()
            .database_path(":memory:")
            .download_dir("/tmp/downloads")
            .remote_gateway(Arc::new(EmptyGateway))
            .build();

        assert!(matches!(
            result,
            Err(Error::CapabilityMissing { capability, .. }) if capability == "DownloadTransport"
        ));
    }
}
