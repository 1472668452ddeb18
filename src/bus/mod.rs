//! Job updates: types, channel and relay.
//!
//! ## Contents
//! - [`Status`], [`Update`], [`Message`] update classification and payload
//! - [`channel`], [`UpdateSink`], [`UpdateStream`] multi-producer, single-consumer channel
//! - [`Relay`], [`UpdateObserver`], [`Expect`] consumer delivering updates to observers
//!
//! ## Quick reference
//! - **Producers**: dispatcher worker tasks (one per running job).
//! - **Consumers**: one [`Relay`] per observed batch, and the orphan reaper's tracker
//!   (which receives `Update<u32>` carrying process-group ids).

mod channel;
mod relay;
mod update;

pub use channel::{UpdateSink, UpdateStream, channel};
pub use relay::{Expect, Relay, RelayStats, UpdateObserver};
pub(crate) use relay::panic_message;
pub use update::{Message, Meta, Status, Update};
