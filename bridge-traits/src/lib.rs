//! # Host Bridge Traits
//!
//! Contracts between the content core and the collaborators it does not own.
//!
//! ## Overview
//!
//! The core caches content (lullaby tracks and bedtime stories) that lives in
//! a remote document store and downloads audio assets on request. Both the
//! remote store and the byte transport are external collaborators, expressed
//! here as traits so hosts and tests can inject their own implementations.
//!
//! ## Traits
//!
//! ### Remote content
//! - [`RemoteContentGateway`](remote::RemoteContentGateway) - Full-snapshot reads of
//!   content items, translations and audio-locale variants
//! - [`HttpClient`](http::HttpClient) - Async HTTP used by gateway implementations
//!
//! ### Downloads
//! - [`DownloadTransport`](download::DownloadTransport) - Cancellable, progress-emitting
//!   asset download
//!
//! ### Utilities
//! - [`Clock`](time::Clock) - Time source for deterministic testing
//! - [`LoggerSink`](time::LoggerSink) - Forward structured logs to host logging
//!
//! ## Shared vocabulary
//!
//! [`ContentKind`](remote::ContentKind), [`Locale`](remote::Locale) and
//! [`TranslationField`](remote::TranslationField) are defined here because
//! every layer, from the gateway to the query façade, discriminates on them.
//!
//! ## Error Handling
//!
//! All bridge traits use [`BridgeError`](error::BridgeError). Implementations
//! convert their own failures into it and include enough context (status
//! codes, URLs, paths) to diagnose the failure from a log line.

pub mod download;
pub mod error;
pub mod http;
pub mod remote;
pub mod time;

pub use error::BridgeError;

// Re-export commonly used types
pub use download::{DownloadTransport, DownloadUpdate};
pub use http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, RetryPolicy};
pub use remote::{
    ContentKind, Locale, RemoteAudioLocale, RemoteContentGateway, RemoteContentItem,
    RemoteTranslation, TranslationField,
};
pub use time::{Clock, LogEntry, LogLevel, LoggerSink, ManualClock, SystemClock};
