//! State/effect cores for the fieldbook views.
//!
//! Every view runs on the same model: a pure reducer computes the next
//! state plus a list of effect descriptions; a host executes the
//! descriptions against the passed-down [`fieldbook_sync::SyncContext`]
//! and feeds results back as actions. See [`machine`] for the machinery
//! and [`list`]/[`detail`]/[`upsert`] for the three view instances.

pub mod detail;
pub mod list;
pub mod machine;
pub mod upsert;

pub use machine::{Dispatcher, Effects, Host, Machine, Timeouts, pump_broadcast};
