//! Download Transport Implementation using Reqwest
//!
//! Streams the response body into `<destination>.part` and renames it into
//! place once every byte is written. The partial file is removed on failure,
//! cancellation or when the update stream is dropped.

use bridge_traits::download::{DownloadTransport, DownloadUpdate};
use bridge_traits::error::{BridgeError, Result};
use futures_util::stream::{self, BoxStream};
use futures_util::StreamExt;
use reqwest::Client;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::http::USER_AGENT;

/// Longest wait for the response headers or the next body chunk
const DEFAULT_STALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Reqwest-based download transport
///
/// Each call spawns one task on the current tokio runtime.
pub struct HttpDownloadTransport {
    client: Client,
    stall_timeout: Duration,
}

impl HttpDownloadTransport {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| {
                BridgeError::OperationFailed(format!("Failed to build download client: {}", e))
            })?;

        Ok(Self::with_client(client, DEFAULT_STALL_TIMEOUT))
    }

    pub fn with_client(client: Client, stall_timeout: Duration) -> Self {
        Self {
            client,
            stall_timeout,
        }
    }
}

impl DownloadTransport for HttpDownloadTransport {
    fn download(
        &self,
        url: &str,
        destination: &Path,
        cancel: CancellationToken,
    ) -> BoxStream<'static, DownloadUpdate> {
        let (updates, rx) = mpsc::unbounded_channel();

        let job = DownloadJob {
            client: self.client.clone(),
            url: url.to_string(),
            destination: destination.to_path_buf(),
            stall_timeout: self.stall_timeout,
            cancel,
            updates,
        };
        tokio::spawn(job.run());

        stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|update| (update, rx))
        })
        .boxed()
    }
}

struct DownloadJob {
    client: Client,
    url: String,
    destination: PathBuf,
    stall_timeout: Duration,
    cancel: CancellationToken,
    updates: mpsc::UnboundedSender<DownloadUpdate>,
}

impl DownloadJob {
    async fn run(self) {
        let Some(part) = part_path(&self.destination) else {
            self.send(DownloadUpdate::Failed {
                reason: format!("invalid destination: {}", self.destination.display()),
            });
            return;
        };

        let outcome = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(None),
            result = self.transfer(&part) => result.map_err(Some),
        };

        let terminal = match outcome {
            Ok(()) => DownloadUpdate::Completed {
                path: self.destination.clone(),
            },
            Err(reason) => {
                remove_partial(&part).await;
                match reason {
                    None => DownloadUpdate::Cancelled,
                    Some(reason) => {
                        warn!(reason = %reason, "Asset download failed");
                        DownloadUpdate::Failed { reason }
                    }
                }
            }
        };
        self.send(terminal);
    }

    async fn transfer(&self, part: &Path) -> std::result::Result<(), String> {
        if let Some(parent) = self.destination.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| format!("cannot create download directory: {}", e))?;
        }

        let response = tokio::time::timeout(self.stall_timeout, self.client.get(&self.url).send())
            .await
            .map_err(|_| format!("no response within {:?}", self.stall_timeout))?
            .map_err(|e| format!("request failed: {}", e))?;

        if !response.status().is_success() {
            return Err(format!("HTTP {}", response.status().as_u16()));
        }

        let total_bytes = response.content_length().filter(|total| *total > 0);
        self.send(DownloadUpdate::Started { total_bytes });

        let mut file = tokio::fs::File::create(part)
            .await
            .map_err(|e| format!("cannot create partial file: {}", e))?;

        let mut body = response.bytes_stream();
        let mut written: u64 = 0;
        let mut last_percent: Option<u8> = None;

        loop {
            let chunk = match tokio::time::timeout(self.stall_timeout, body.next()).await {
                Err(_) => return Err(format!("transfer stalled for {:?}", self.stall_timeout)),
                Ok(None) => break,
                Ok(Some(Err(e))) => return Err(format!("transfer interrupted: {}", e)),
                Ok(Some(Ok(chunk))) => chunk,
            };

            file.write_all(&chunk)
                .await
                .map_err(|e| format!("write failed: {}", e))?;
            written += chunk.len() as u64;

            if let Some(total) = total_bytes {
                let percent = (written.saturating_mul(100) / total).min(100) as u8;
                if last_percent.map_or(true, |last| percent > last) {
                    last_percent = Some(percent);
                    self.send(DownloadUpdate::Progress { percent });
                }
            }

            if self.updates.is_closed() {
                return Err("update stream dropped".to_string());
            }
        }

        file.flush()
            .await
            .map_err(|e| format!("flush failed: {}", e))?;
        drop(file);

        if let Some(total) = total_bytes {
            if written != total {
                return Err(format!("expected {} bytes, received {}", total, written));
            }
        }

        tokio::fs::rename(part, &self.destination)
            .await
            .map_err(|e| format!("cannot move download into place: {}", e))?;

        debug!(bytes = written, "Asset download finished");
        Ok(())
    }

    fn send(&self, update: DownloadUpdate) {
        // A dropped receiver is noticed by the transfer loop.
        let _ = self.updates.send(update);
    }
}

/// `<destination>.part`
fn part_path(destination: &Path) -> Option<PathBuf> {
    let mut name = destination.file_name()?.to_os_string();
    name.push(".part");
    Some(destination.with_file_name(name))
}

async fn remove_partial(part: &Path) {
    if let Err(e) = tokio::fs::remove_file(part).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(error = %e, "Failed to remove partial download");
        }
    }
}
