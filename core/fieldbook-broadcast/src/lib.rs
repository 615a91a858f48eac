//! Cross-tab broadcast for fieldbook.
//!
//! Keeps independently running view hosts ("tabs") consistent: one tab's
//! sync pass, deletion, or connectivity change is published to the others.
//! The engine talks to a [`BusTransport`] abstraction; [`InProcessBus`] is
//! the adapter for single-process deployments.

mod bus;
mod message;

pub use bus::{
    Broadcaster, BusError, BusReceiver, BusRecvError, BusResult, BusTransport,
    DEFAULT_BUS_CAPACITY, InProcessBus, Subscription,
};
pub use message::{BroadcastMessage, Delivery, Envelope, TabId};
