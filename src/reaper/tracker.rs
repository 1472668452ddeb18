//! Tracker task: turns process-group updates into reaper log entries.
//!
//! `Started` → `ADD <pgid>`, terminal → `REM <pgid>`, sentinel or closed channel → exit.
//! A failed write is logged and the task keeps going.
//!
//! The stream lives in an [`Inbox`] that also mirrors the live groups in memory. The
//! inbox is locked only while polling, so the drop guard can take it over at any point
//! and see every group that started, written to the log or not.

use std::collections::BTreeSet;
use std::future::poll_fn;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};

use tokio::task::JoinHandle;

use super::log::{Entry, ReaperLog};
use crate::bus::{Message, Update, UpdateStream};

/// Tracker input plus the in-memory view of running groups.
#[derive(Debug)]
pub(crate) struct Inbox {
    stream: UpdateStream<u32>,
    live: BTreeSet<u32>,
}

pub(crate) type SharedInbox = Arc<Mutex<Inbox>>;

enum Next {
    Entry(Entry),
    Skip,
    Stop,
}

impl Inbox {
    pub fn shared(stream: UpdateStream<u32>) -> SharedInbox {
        Arc::new(Mutex::new(Self {
            stream,
            live: BTreeSet::new(),
        }))
    }

    fn apply(&mut self, up: &Update<u32>) -> Option<Entry> {
        let entry = match up.meta {
            0 => return None,
            pgid if up.is_terminal() => Entry::Rem(pgid),
            pgid => Entry::Add(pgid),
        };
        match entry {
            Entry::Add(pgid) => self.live.insert(pgid),
            Entry::Rem(pgid) => self.live.remove(&pgid),
        };
        Some(entry)
    }

    fn poll_next(&mut self, cx: &mut Context<'_>) -> Poll<Next> {
        match self.stream.poll_recv(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Some(Message::Update(up))) => Poll::Ready(match self.apply(&up) {
                Some(entry) => Next::Entry(entry),
                None => Next::Skip,
            }),
            Poll::Ready(_) => Poll::Ready(Next::Stop),
        }
    }

    /// Applies every queued update and returns the groups still running.
    pub fn settle(&mut self) -> BTreeSet<u32> {
        while let Some(msg) = self.stream.try_recv() {
            if let Message::Update(up) = msg {
                self.apply(&up);
            }
        }
        self.live.clone()
    }
}

pub(crate) fn lock(inbox: &SharedInbox) -> MutexGuard<'_, Inbox> {
    inbox.lock().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn spawn(log: ReaperLog, inbox: SharedInbox) -> JoinHandle<()> {
    tokio::spawn(track(log, inbox))
}

async fn track(mut log: ReaperLog, inbox: SharedInbox) {
    loop {
        let entry = match poll_fn(|cx| lock(&inbox).poll_next(cx)).await {
            Next::Entry(entry) => entry,
            Next::Skip => continue,
            Next::Stop => break,
        };
        if let Err(err) = log.append(entry).await {
            tracing::warn!(
                path = %log.path().display(),
                entry = %entry,
                error = %err,
                "reaper log write failed"
            );
        }
    }
}
