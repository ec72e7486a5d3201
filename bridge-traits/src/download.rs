//! Download Transport Abstraction
//!
//! A transport moves the bytes of one remote asset to a local destination and
//! reports what happens as a stream of [`DownloadUpdate`]s. The stream ends
//! after the first terminal update (`Completed`, `Failed` or `Cancelled`).
//!
//! Transports own their timeouts. A timeout is reported as `Failed`.

use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;

/// Progress report from a download transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "update")]
pub enum DownloadUpdate {
    /// Transfer began; total size when the remote announced one
    Started { total_bytes: Option<u64> },
    /// Completion percentage, 0..=100
    Progress { percent: u8 },
    /// Asset fully written to `path`
    Completed { path: PathBuf },
    /// Transfer failed; nothing usable was left at the destination
    Failed { reason: String },
    /// Transfer stopped because the token was cancelled
    Cancelled,
}

impl DownloadUpdate {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DownloadUpdate::Completed { .. } | DownloadUpdate::Failed { .. } | DownloadUpdate::Cancelled
        )
    }
}

/// Download transport trait
///
/// # Example
///
/// ```ignore
/// use futures::StreamExt;
///
/// let mut updates = transport.download(url, &dest, token.clone());
/// while let Some(update) = updates.next().await {
///     if update.is_terminal() {
///         break;
///     }
/// }
/// ```
pub trait DownloadTransport: Send + Sync {
    /// Start downloading `url` into `destination`.
    ///
    /// Cancelling `cancel` must stop the transfer, remove partial output and
    /// end the stream with [`DownloadUpdate::Cancelled`].
    fn download(
        &self,
        url: &str,
        destination: &Path,
        cancel: CancellationToken,
    ) -> BoxStream<'static, DownloadUpdate>;
}
