//! Connectivity signal source.

use std::sync::Arc;
use tokio::sync::watch;

/// The connectivity signal: `None` until the first signal arrives, then
/// the last reported value.
#[derive(Clone)]
pub struct ConnectivitySignal {
    sender: Arc<watch::Sender<Option<bool>>>,
}

impl ConnectivitySignal {
    /// Creates a signal in the unknown state.
    #[must_use]
    pub fn new() -> Self {
        let (sender, _) = watch::channel(None);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Reports a connectivity change.
    pub fn emit(&self, connected: bool) {
        self.sender.send_replace(Some(connected));
    }

    /// The last reported value, `None` while still unknown.
    #[must_use]
    pub fn current(&self) -> Option<bool> {
        *self.sender.borrow()
    }

    /// Subscribes to future changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Option<bool>> {
        self.sender.subscribe()
    }
}

impl Default for ConnectivitySignal {
    fn default() -> Self {
        Self::new()
    }
}
