//! Change notification for observable queries.
//!
//! Every committed write transaction publishes one [`ContentChange`] per
//! content kind it touched. Subscribers re-run their queries on receipt.
//! Closing the notifier ends every observer.

use crate::models::ContentKind;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

const DEFAULT_CAPACITY: usize = 64;

/// A committed change to rows of one content kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentChange {
    pub kind: ContentKind,
}

/// Broadcasts committed changes to every live subscriber
#[derive(Debug, Clone)]
pub struct ChangeNotifier {
    sender: broadcast::Sender<ContentChange>,
    closed: CancellationToken,
}

impl ChangeNotifier {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            closed: CancellationToken::new(),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ContentChange> {
        self.sender.subscribe()
    }

    /// Publish a change. Having no subscribers is not an error.
    pub fn notify(&self, kind: ContentKind) {
        let receivers = self.sender.send(ContentChange { kind }).unwrap_or(0);
        trace!(kind = %kind, receivers, "Published content change");
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Signal observers that no further changes will be published
    pub fn close(&self) {
        if !self.closed.is_cancelled() {
            debug!("Closing change notifier");
            self.closed.cancel();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Token cancelled once [`ChangeNotifier::close`] is called
    pub fn closed_token(&self) -> CancellationToken {
        self.closed.clone()
    }
}

impl Default for ChangeNotifier {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
