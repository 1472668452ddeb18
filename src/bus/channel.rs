//! # Update channel.
//!
//! [`channel`] returns an [`UpdateSink`] (cloneable, many producers) and an
//! [`UpdateStream`] (single consumer). It is a thin wrapper over
//! [`tokio::sync::mpsc`]'s unbounded channel.
//!
//! ## Architecture
//! ```text
//! Producers (many):                      Consumer (one):
//!   worker #0 ──┐
//!   worker #1 ──┼──► UpdateSink ───► UpdateStream ───► Relay / reaper tracker
//!   worker #N ──┘   (unbounded)
//! ```
//!
//! ## Rules
//! - **Non-blocking send**: workers never wait on a slow consumer.
//! - **No loss while open**: unlike a broadcast ring, every message is kept until read.
//! - **Close = stop**: when every sink is dropped the stream yields `None`.

use std::task::{Context, Poll};

use tokio::sync::mpsc;

use super::update::{Message, Meta, Update};

/// Sending half of an update channel.
#[derive(Debug)]
pub struct UpdateSink<M = Meta> {
    tx: mpsc::UnboundedSender<Message<M>>,
}

impl<M> Clone for UpdateSink<M> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<M> UpdateSink<M> {
    /// Publishes an update.
    ///
    /// If the consumer is gone the update is dropped; this never fails the caller.
    pub fn publish(&self, up: Update<M>) {
        let _ = self.tx.send(Message::Update(up));
    }

    /// Tells the consumer to stop waiting.
    pub fn sentinel(&self) {
        let _ = self.tx.send(Message::Sentinel);
    }

    /// True once the consumer has been dropped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Receiving half of an update channel.
#[derive(Debug)]
pub struct UpdateStream<M = Meta> {
    rx: mpsc::UnboundedReceiver<Message<M>>,
}

impl<M> UpdateStream<M> {
    /// Receives the next message; `None` once every sink is dropped.
    pub async fn recv(&mut self) -> Option<Message<M>> {
        self.rx.recv().await
    }

    /// Polls for the next message; `Ready(None)` once every sink is dropped.
    pub fn poll_recv(&mut self, cx: &mut Context<'_>) -> Poll<Option<Message<M>>> {
        self.rx.poll_recv(cx)
    }

    /// Takes the next queued message without waiting.
    pub fn try_recv(&mut self) -> Option<Message<M>> {
        self.rx.try_recv().ok()
    }
}

/// Creates a connected sink/stream pair.
pub fn channel<M>() -> (UpdateSink<M>, UpdateStream<M>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (UpdateSink { tx }, UpdateStream { rx })
}
