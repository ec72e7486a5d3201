//! # Desktop Bridge Implementations
//!
//! Default implementations of bridge traits for desktop platforms
//! (macOS, Windows, Linux).
//!
//! ## Overview
//!
//! - `HttpClient` using `reqwest`, used by the document store connector
//! - `DownloadTransport` streaming `reqwest` response bodies to disk
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_desktop::{HttpDownloadTransport, ReqwestHttpClient};
//!
//! let http_client = Arc::new(ReqwestHttpClient::new()?);
//! let transport = Arc::new(HttpDownloadTransport::new()?);
//!
//! let config = CoreConfig::builder()
//!     .http_client(http_client)
//!     .download_transport(transport)
//!     // ...
//!     .build()?;
//! ```

mod download;
mod http;

pub use download::HttpDownloadTransport;
pub use http::ReqwestHttpClient;
