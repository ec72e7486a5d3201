//! Document store REST connector
//!
//! Implements [`RemoteContentGateway`] over the `documents.list` endpoint.

use async_trait::async_trait;
use bridge_traits::error::Result;
use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, RetryPolicy};
use bridge_traits::{
    ContentKind, RemoteAudioLocale, RemoteContentGateway, RemoteContentItem, RemoteTranslation,
};
use core_runtime::config::RemoteStoreConfig;
use core_runtime::logging::redact_if_sensitive;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use crate::decode;
use crate::error::DocStoreError;
use crate::types::{Document, ListDocumentsResponse};

/// Per-request timeout
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Document store connector
///
/// Lists whole collections, following `nextPageToken` until exhausted.
///
/// # Features
///
/// - Configurable collection names and page size
/// - Optional API key passed as the `key` query parameter
/// - Retry with exponential backoff on `429`, `5xx` and transport errors
/// - Fail-closed decoding of every document
///
/// # Example
///
/// ```ignore
/// use provider_docstore::DocStoreConnector;
/// use bridge_traits::RemoteContentGateway;
///
/// let connector = DocStoreConnector::new(http_client, RemoteStoreConfig::new("nightlight-prod"));
/// let stories = connector.fetch_content_items(ContentKind::Story).await?;
/// ```
pub struct DocStoreConnector {
    http_client: Arc<dyn HttpClient>,
    config: RemoteStoreConfig,
    retry_policy: RetryPolicy,
    request_timeout: Duration,
}

impl DocStoreConnector {
    pub fn new(http_client: Arc<dyn HttpClient>, config: RemoteStoreConfig) -> Self {
        Self {
            http_client,
            config,
            retry_policy: RetryPolicy::default(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn config(&self) -> &RemoteStoreConfig {
        &self.config
    }

    fn page_url(&self, collection: &str, page_token: Option<&str>) -> String {
        let mut url = format!(
            "{}?pageSize={}",
            self.config.documents_url(collection),
            self.config.page_size
        );

        if let Some(token) = page_token {
            url.push_str("&pageToken=");
            url.push_str(&urlencoding::encode(token));
        }

        if let Some(key) = &self.config.api_key {
            url.push_str("&key=");
            url.push_str(&urlencoding::encode(key));
        }

        url
    }

    /// Every document of a collection, across all pages
    #[instrument(skip(self))]
    async fn list_collection(&self, collection: &str) -> Result<Vec<Document>> {
        let mut documents = Vec::new();
        let mut page_token: Option<String> = None;
        let mut seen_tokens = HashSet::new();
        let mut pages = 0u32;

        loop {
            let url = self.page_url(collection, page_token.as_deref());
            let response = self.execute_with_retry(url).await?;

            let page: ListDocumentsResponse = response.json().map_err(|e| {
                DocStoreError::ParseError(format!("collection {}: {}", collection, e))
            })?;
            pages += 1;
            documents.extend(page.documents);

            match page.next_page_token.filter(|token| !token.is_empty()) {
                Some(token) => {
                    if !seen_tokens.insert(token.clone()) {
                        return Err(DocStoreError::PaginationStalled {
                            collection: collection.to_string(),
                        }
                        .into());
                    }
                    page_token = Some(token);
                }
                None => break,
            }
        }

        debug!(collection, pages, documents = documents.len(), "Listed collection");
        Ok(documents)
    }

    /// Execute a GET with retry on throttling, server errors and transport failures
    async fn execute_with_retry(&self, url: String) -> Result<HttpResponse> {
        let max_attempts = self.retry_policy.max_attempts.max(1);
        let logged_url = redact_if_sensitive("url", &url);

        let mut attempt = 1;
        loop {
            let request = HttpRequest::new(HttpMethod::Get, url.clone())
                .header("Accept", "application/json")
                .timeout(self.request_timeout);

            let failure = match self.http_client.execute(request).await {
                Ok(response) if response.is_success() => {
                    debug!(url = %logged_url, status = response.status, "API request succeeded");
                    return Ok(response);
                }
                Ok(response) if response.is_retryable() => {
                    if attempt >= max_attempts {
                        warn!(url = %logged_url, status = response.status, attempts = max_attempts, "API request failed after retries");
                        return Err(DocStoreError::RetriesExhausted {
                            status_code: response.status,
                            attempts: max_attempts,
                        }
                        .into());
                    }
                    format!("status {}", response.status)
                }
                Ok(response) => {
                    warn!(url = %logged_url, status = response.status, "API request failed");
                    return Err(DocStoreError::ApiError {
                        status_code: response.status,
                        message: String::from_utf8_lossy(&response.body).to_string(),
                    }
                    .into());
                }
                Err(e) => {
                    if attempt >= max_attempts {
                        warn!(url = %logged_url, error = %e, attempts = max_attempts, "API request failed after retries");
                        return Err(e);
                    }
                    e.to_string()
                }
            };

            let delay = self.retry_policy.delay_for_attempt(attempt);
            warn!(
                url = %logged_url,
                attempt,
                max_attempts,
                delay_ms = delay.as_millis() as u64,
                reason = %failure,
                "API request failed, retrying"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}

#[async_trait]
impl RemoteContentGateway for DocStoreConnector {
    #[instrument(skip(self), fields(kind = %kind))]
    async fn fetch_content_items(&self, kind: ContentKind) -> Result<Vec<RemoteContentItem>> {
        let collection = self.config.items_collection(kind);
        let documents = self.list_collection(collection).await?;
        let total = documents.len();

        let items: Vec<_> = documents
            .iter()
            .filter_map(|doc| decode::content_item(doc, kind))
            .collect();

        info!(collection, items = items.len(), dropped = total - items.len(), "Fetched content items");
        Ok(items)
    }

    #[instrument(skip(self), fields(kind = %kind))]
    async fn fetch_translations(&self, kind: ContentKind) -> Result<Vec<RemoteTranslation>> {
        let collection = self.config.translations_collection(kind);
        let documents = self.list_collection(collection).await?;

        let translations: Vec<_> = documents.iter().filter_map(decode::translation).collect();

        info!(collection, translations = translations.len(), "Fetched translations");
        Ok(translations)
    }

    #[instrument(skip(self), fields(kind = %kind))]
    async fn fetch_audio_locales(&self, kind: ContentKind) -> Result<Vec<RemoteAudioLocale>> {
        let Some(collection) = self.config.audio_collection(kind) else {
            return Ok(Vec::new());
        };
        let documents = self.list_collection(collection).await?;

        let variants: Vec<_> = documents.iter().filter_map(decode::audio_locale).collect();

        info!(collection, variants = variants.len(), "Fetched audio locales");
        Ok(variants)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::error::BridgeError;
    use bytes::Bytes;
    use mockall::mock;
    use mockall::Sequence;
    use std::collections::HashMap;

    mock! {
        HttpClient {}

        #[async_trait]
        impl HttpClient for HttpClient {
            async fn execute(&self, request: HttpRequest) -> Result<HttpResponse>;
        }
    }

    fn response(status: u16, body: &str) -> HttpResponse {
        HttpResponse {
            status,
            headers: HashMap::new(),
            body: Bytes::from(body.to_string()),
        }
    }

    fn fast_retry(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
            use_exponential_backoff: true,
        }
    }

    fn connector(mock_http: MockHttpClient) -> DocStoreConnector {
        let config = RemoteStoreConfig::new("nightlight")
            .with_base_url("https://store.example/v1")
            .with_page_size(2)
            .with_api_key("AIza-secret");
        DocStoreConnector::new(Arc::new(mock_http), config).with_retry_policy(fast_retry(3))
    }

    const STORY_PAGE_1: &str = r#"{
        "documents": [
            {
                "name": "projects/nightlight/databases/(default)/documents/stories/owl",
                "fields": {
                    "id": { "integerValue": "1" },
                    "name": { "stringValue": "The Sleepy Owl" },
                    "audioPath": { "stringValue": "stories/owl.mp3" },
                    "popularity": { "integerValue": "9" }
                },
                "createTime": "2024-01-01T00:00:00Z"
            },
            { "fields": { "id": { "integerValue": "2" } } }
        ],
        "nextPageToken": "next/page"
    }"#;

    const STORY_PAGE_2: &str = r#"{
        "documents": [
            {
                "name": "projects/nightlight/databases/(default)/documents/stories/fox",
                "fields": { "id": { "integerValue": "3" }, "name": { "stringValue": "Fox" } }
            }
        ]
    }"#;

    #[tokio::test]
    async fn test_fetch_content_items_follows_pages() {
        let mut mock_http = MockHttpClient::new();
        let mut seq = Sequence::new();

        mock_http
            .expect_execute()
            .times(1)
            .in_sequence(&mut seq)
            .withf(|request| {
                request.url
                    == "https://store.example/v1/projects/nightlight/databases/(default)/documents/stories?pageSize=2&key=AIza-secret"
            })
            .returning(|_| Ok(response(200, STORY_PAGE_1)));
        mock_http
            .expect_execute()
            .times(1)
            .in_sequence(&mut seq)
            .withf(|request| request.url.contains("&pageToken=next%2Fpage&"))
            .returning(|_| Ok(response(200, STORY_PAGE_2)));

        let items = connector(mock_http)
            .fetch_content_items(ContentKind::Story)
            .await
            .unwrap();

        let ids: Vec<_> = items.iter().map(|item| item.document_id.as_str()).collect();
        assert_eq!(ids, vec!["owl", "fox"]);
        assert_eq!(items[0].popularity_count, 9);
        assert_eq!(items[0].kind, ContentKind::Story);
    }

    #[tokio::test]
    async fn test_retries_server_errors() {
        let mut mock_http = MockHttpClient::new();
        let mut seq = Sequence::new();

        mock_http
            .expect_execute()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(response(503, "unavailable")));
        mock_http
            .expect_execute()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Err(BridgeError::OperationFailed("connection reset".to_string())));
        mock_http
            .expect_execute()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(response(200, "{}")));

        let translations = connector(mock_http)
            .fetch_translations(ContentKind::Track)
            .await
            .unwrap();
        assert!(translations.is_empty());
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let mut mock_http = MockHttpClient::new();
        mock_http
            .expect_execute()
            .times(3)
            .returning(|_| Ok(response(429, "slow down")));

        let result = connector(mock_http).fetch_content_items(ContentKind::Track).await;
        assert!(matches!(result, Err(BridgeError::NotAvailable(_))));
    }

    #[tokio::test]
    async fn test_client_errors_are_not_retried() {
        let mut mock_http = MockHttpClient::new();
        mock_http
            .expect_execute()
            .times(1)
            .returning(|_| Ok(response(403, "permission denied")));

        let result = connector(mock_http).fetch_content_items(ContentKind::Story).await;
        match result {
            Err(BridgeError::OperationFailed(message)) => {
                assert!(message.contains("403"));
                assert!(message.contains("permission denied"));
            }
            other => panic!("unexpected result: {:?}", other.map(|items| items.len())),
        }
    }

    #[tokio::test]
    async fn test_malformed_body_is_an_error() {
        let mut mock_http = MockHttpClient::new();
        mock_http
            .expect_execute()
            .times(1)
            .returning(|_| Ok(response(200, "<html>")));

        let result = connector(mock_http).fetch_translations(ContentKind::Story).await;
        assert!(matches!(result, Err(BridgeError::OperationFailed(_))));
    }

    #[tokio::test]
    async fn test_repeated_page_token_stops_listing() {
        let mut mock_http = MockHttpClient::new();
        mock_http
            .expect_execute()
            .times(2)
            .returning(|_| Ok(response(200, r#"{ "nextPageToken": "same" }"#)));

        let result = connector(mock_http).fetch_audio_locales(ContentKind::Story).await;
        assert!(matches!(result, Err(BridgeError::OperationFailed(msg)) if msg.contains("story_audio")));
    }

    #[tokio::test]
    async fn test_tracks_have_no_audio_collection() {
        let mock_http = MockHttpClient::new();
        let audio = connector(mock_http)
            .fetch_audio_locales(ContentKind::Track)
            .await
            .unwrap();
        assert!(audio.is_empty());
    }
}
