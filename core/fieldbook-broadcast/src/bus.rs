//! The broadcast bus: a transport trait plus the in-process adapter.
//!
//! Delivery is best-effort, at-least-once to other tabs. A subscriber that
//! falls behind loses the oldest envelopes (the transport reports the lag)
//! and keeps receiving; consumers treat handlers as idempotent, so a
//! re-applied payload is harmless.

use crate::message::{BroadcastMessage, Delivery, Envelope, TabId};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Default envelope buffer per subscriber.
pub const DEFAULT_BUS_CAPACITY: usize = 64;

/// Result type for bus operations.
pub type BusResult<T> = Result<T, BusError>;

/// Errors that can occur on the bus.
#[derive(Debug, Error)]
pub enum BusError {
    /// No subscriber is listening and the transport cannot buffer.
    #[error("bus closed")]
    Closed,
}

/// Error receiving the next envelope.
#[derive(Debug, Error)]
pub enum BusRecvError {
    /// The transport shut down.
    #[error("bus closed")]
    Closed,

    /// The subscriber fell behind and lost envelopes.
    #[error("lagged behind by {0} envelopes")]
    Lagged(u64),
}

/// One subscriber's receive side, transport-specific behind the trait.
#[async_trait]
pub trait BusReceiver: Send {
    /// Receives the next envelope.
    async fn recv(&mut self) -> Result<Envelope, BusRecvError>;
}

/// A broadcast transport scoped to one browser/process.
///
/// The engine only ever talks to this trait; [`InProcessBus`] is the
/// adapter for single-process deployments, and other platforms supply
/// their own (OS pipes, local sockets).
pub trait BusTransport: Send + Sync {
    /// Publishes an envelope to every subscriber.
    fn post(&self, envelope: Envelope) -> BusResult<()>;

    /// Opens a new subscription. Only envelopes posted after this call are
    /// delivered.
    fn subscribe(&self) -> Box<dyn BusReceiver>;
}

/// In-process bus adapter over `tokio::sync::broadcast`.
#[derive(Clone)]
pub struct InProcessBus {
    sender: broadcast::Sender<Envelope>,
}

impl InProcessBus {
    /// Creates a bus with the default capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_BUS_CAPACITY)
    }

    /// Creates a bus with the given per-subscriber buffer capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }
}

impl Default for InProcessBus {
    fn default() -> Self {
        Self::new()
    }
}

struct InProcessReceiver(broadcast::Receiver<Envelope>);

#[async_trait]
impl BusReceiver for InProcessReceiver {
    async fn recv(&mut self) -> Result<Envelope, BusRecvError> {
        match self.0.recv().await {
            Ok(envelope) => Ok(envelope),
            Err(broadcast::error::RecvError::Closed) => Err(BusRecvError::Closed),
            Err(broadcast::error::RecvError::Lagged(n)) => Err(BusRecvError::Lagged(n)),
        }
    }
}

impl BusTransport for InProcessBus {
    fn post(&self, envelope: Envelope) -> BusResult<()> {
        // A send with zero subscribers is not an error: nobody was listening.
        let _ = self.sender.send(envelope);
        Ok(())
    }

    fn subscribe(&self) -> Box<dyn BusReceiver> {
        Box::new(InProcessReceiver(self.sender.subscribe()))
    }
}

/// One tab's handle on the bus.
///
/// Constructed once per view host at process start and passed down; never
/// looked up through ambient state.
#[derive(Clone)]
pub struct Broadcaster {
    tab_id: TabId,
    transport: Arc<dyn BusTransport>,
}

impl Broadcaster {
    /// Creates a broadcaster for a fresh tab on the given transport.
    #[must_use]
    pub fn new(transport: Arc<dyn BusTransport>) -> Self {
        Self::with_tab_id(TabId::new(), transport)
    }

    /// Creates a broadcaster with an explicit tab id.
    #[must_use]
    pub fn with_tab_id(tab_id: TabId, transport: Arc<dyn BusTransport>) -> Self {
        Self { tab_id, transport }
    }

    /// This tab's id.
    #[must_use]
    pub fn tab_id(&self) -> TabId {
        self.tab_id
    }

    /// Publishes a message with the given delivery scope.
    pub fn publish(&self, message: BroadcastMessage, delivery: Delivery) -> BusResult<()> {
        debug!(origin = %self.tab_id, ?delivery, "publishing broadcast message");
        self.transport.post(Envelope {
            origin: self.tab_id,
            delivery,
            message,
        })
    }

    /// Opens this tab's subscription, filtered by delivery scope.
    #[must_use]
    pub fn subscribe(&self) -> Subscription {
        Subscription {
            tab_id: self.tab_id,
            receiver: self.transport.subscribe(),
        }
    }
}

/// A tab-side subscription that applies origin/delivery filtering.
pub struct Subscription {
    tab_id: TabId,
    receiver: Box<dyn BusReceiver>,
}

impl Subscription {
    /// Receives the next message addressed to this tab.
    ///
    /// Returns `None` once the transport shuts down. Lag is logged and
    /// skipped over.
    pub async fn recv(&mut self) -> Option<BroadcastMessage> {
        loop {
            match self.receiver.recv().await {
                Ok(envelope) if envelope.delivers_to(self.tab_id) => {
                    return Some(envelope.message);
                }
                Ok(_) => continue,
                Err(BusRecvError::Lagged(n)) => {
                    warn!(tab = %self.tab_id, lagged = n, "subscriber lagged, envelopes lost");
                    continue;
                }
                Err(BusRecvError::Closed) => return None,
            }
        }
    }
}
