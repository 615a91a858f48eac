//! The state/effect machinery every view runs on.
//!
//! A view is a pure reducer plus an enum of effect descriptions. The
//! reducer computes the next state by copy-on-write and pushes effect
//! descriptions (plain data) into the new state's bucket; it performs no
//! I/O. The host observes each transition, drains the bucket, and executes
//! each description against the view's `run_effect`, which feeds results
//! back solely by dispatching new actions.

use async_trait::async_trait;
use fieldbook_broadcast::BroadcastMessage;
use fieldbook_sync::SyncContext;
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{debug, trace};

/// The per-transition effect bucket.
///
/// Reset to "no effect" at the start of every reducer invocation, so the
/// effects recorded on a state are exactly those pushed in the transition
/// that produced it.
#[derive(Debug, Clone)]
pub struct Effects<E>(Vec<E>);

impl<E> Default for Effects<E> {
    fn default() -> Self {
        Self(Vec::new())
    }
}

impl<E> Effects<E> {
    /// An empty bucket.
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    /// Records an effect description for this transition.
    pub fn push(&mut self, effect: E) {
        self.0.push(effect);
    }

    /// Whether this transition recorded any effects.
    #[must_use]
    pub fn has_effects(&self) -> bool {
        !self.0.is_empty()
    }

    /// Drains the bucket for execution.
    pub fn take(&mut self) -> Vec<E> {
        std::mem::take(&mut self.0)
    }

    /// The recorded descriptions, for assertions.
    #[must_use]
    pub fn as_slice(&self) -> &[E] {
        &self.0
    }
}

/// Clonable handle for feeding actions into a view.
pub struct Dispatcher<A> {
    sender: mpsc::UnboundedSender<A>,
}

impl<A> Clone for Dispatcher<A> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}

impl<A: fmt::Debug> Dispatcher<A> {
    /// Dispatches an action. A dropped host makes this a logged no-op.
    pub fn dispatch(&self, action: A) {
        if self.sender.send(action).is_err() {
            debug!("dispatch after host shutdown, dropping action");
        }
    }
}

/// Per-view registry of scheduled timers, keyed by logical name.
///
/// Owned exclusively by the host that created it. Scheduling under an
/// occupied key supersedes the previous timer; clearing an absent or
/// already-fired key is a no-op.
pub struct Timeouts<K> {
    handles: HashMap<K, AbortHandle>,
}

impl<K: Eq + Hash> Default for Timeouts<K> {
    fn default() -> Self {
        Self {
            handles: HashMap::new(),
        }
    }
}

impl<K: Eq + Hash> Timeouts<K> {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedules `action` to be dispatched after `delay`, superseding any
    /// timer under the same key.
    pub fn schedule<A: fmt::Debug + Send + 'static>(
        &mut self,
        key: K,
        delay: Duration,
        dispatch: Dispatcher<A>,
        action: A,
    ) {
        self.clear(&key);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            dispatch.dispatch(action);
        });
        self.handles.insert(key, handle.abort_handle());
    }

    /// Cancels the timer under `key`, if one is still pending.
    pub fn clear(&mut self, key: &K) {
        if let Some(handle) = self.handles.remove(key) {
            handle.abort();
        }
    }

    /// Number of tracked handles (fired timers included until cleared).
    #[must_use]
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}

/// One view's state machine: pure reduction plus effect execution.
#[async_trait]
pub trait Machine: Sized + Send + 'static {
    type State: Send;
    type Action: fmt::Debug + Send + 'static;
    type Effect: fmt::Debug + Send;
    type TimerKey: Eq + Hash + Send;

    /// Pure transition. Must start from an effect-cleared copy of `state`
    /// and never perform I/O.
    fn reduce(state: &Self::State, action: Self::Action) -> Self::State;

    /// Drains the effect bucket off a freshly computed state.
    fn take_effects(state: &mut Self::State) -> Vec<Self::Effect>;

    /// Executes one effect description. Communicates results only through
    /// `dispatch`; must not let an error escape as a panic.
    async fn run_effect(
        effect: Self::Effect,
        ctx: &SyncContext,
        timeouts: &mut Timeouts<Self::TimerKey>,
        dispatch: Dispatcher<Self::Action>,
    );

    /// Maps a cross-tab broadcast message onto this view's actions.
    fn from_broadcast(message: BroadcastMessage) -> Option<Self::Action>;
}

/// Runs one view: owns its state, action queue, and timer registry.
pub struct Host<M: Machine> {
    state: M::State,
    sender: mpsc::UnboundedSender<M::Action>,
    receiver: mpsc::UnboundedReceiver<M::Action>,
    timeouts: Timeouts<M::TimerKey>,
}

impl<M: Machine> Host<M> {
    /// Creates a host around an initial state.
    #[must_use]
    pub fn new(initial: M::State) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            state: initial,
            sender,
            receiver,
            timeouts: Timeouts::new(),
        }
    }

    /// The current state.
    #[must_use]
    pub fn state(&self) -> &M::State {
        &self.state
    }

    /// A handle for dispatching actions into this host.
    #[must_use]
    pub fn dispatcher(&self) -> Dispatcher<M::Action> {
        Dispatcher {
            sender: self.sender.clone(),
        }
    }

    /// Applies one action: reduce, then execute this transition's effects.
    /// Actions dispatched by those effects queue for later application.
    pub async fn apply(&mut self, action: M::Action, ctx: &SyncContext) {
        trace!(?action, "applying action");
        let mut next = M::reduce(&self.state, action);
        let effects = M::take_effects(&mut next);
        self.state = next;
        let dispatch = self.dispatcher();
        for effect in effects {
            trace!(?effect, "running effect");
            M::run_effect(effect, ctx, &mut self.timeouts, dispatch.clone()).await;
        }
    }

    /// Applies every queued action, including ones dispatched by effects
    /// run along the way. For deterministic tests.
    pub async fn settle(&mut self, ctx: &SyncContext) {
        while let Ok(action) = self.receiver.try_recv() {
            self.apply(action, ctx).await;
        }
    }

    /// Dispatches an action and settles the queue.
    pub async fn apply_and_settle(&mut self, action: M::Action, ctx: &SyncContext) {
        self.apply(action, ctx).await;
        self.settle(ctx).await;
    }

    /// Runs the view for as long as it is mounted; there is no terminal
    /// state. Actions are serialized, so reductions never overlap.
    pub async fn run(mut self, ctx: SyncContext) {
        while let Some(action) = self.receiver.recv().await {
            self.apply(action, &ctx).await;
        }
    }
}

/// Pumps a tab's broadcast subscription into a view as actions.
#[must_use]
pub fn pump_broadcast<M: Machine>(
    mut subscription: fieldbook_broadcast::Subscription,
    dispatch: Dispatcher<M::Action>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(message) = subscription.recv().await {
            if let Some(action) = M::from_broadcast(message) {
                dispatch.dispatch(action);
            }
        }
    })
}
