//! # Job lifecycle updates.
//!
//! An [`Update`] reports one lifecycle step of one job, identified by its batch index.
//! The [`Status`] enum classifies it:
//! - [`Status::Started`] the job's process is running (optional, always first)
//! - [`Status::Done`] / [`Status::Timeout`] / [`Status::Failed`] terminal, exactly one per started job
//!
//! The channel carries [`Message`]s: an update or the [`Message::Sentinel`] control
//! value telling the consumer to stop waiting.
//!
//! ## Example
//! ```rust
//! use jobvisor::{Status, Update};
//!
//! let up: Update = Update::new(Status::Timeout, 2, "sleep 5");
//! assert!(up.is_terminal());
//! assert!(up.meta.is_null());
//!
//! let tracked = up.with_meta(4242_u32);
//! assert_eq!(tracked.meta, 4242);
//! ```

use std::fmt;
use std::sync::Arc;

/// Opaque per-job metadata carried on updates.
pub type Meta = serde_json::Value;

/// Classification of a job update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    /// The job's process has been started.
    Started,
    /// The job exited successfully.
    Done,
    /// The job exceeded its timeout (or the batch was interrupted) and was terminated.
    Timeout,
    /// The job exited unsuccessfully or could not be started.
    Failed,
}

impl Status {
    /// True for `Done`, `Timeout` and `Failed`.
    #[inline]
    pub fn is_terminal(self) -> bool {
        !matches!(self, Status::Started)
    }

    /// Short lowercase label for logs.
    pub fn as_label(self) -> &'static str {
        match self {
            Status::Started => "started",
            Status::Done => "done",
            Status::Timeout => "timeout",
            Status::Failed => "failed",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_label())
    }
}

/// Lifecycle update for a single job.
///
/// `M` is the metadata type; batch observers see [`Meta`], the orphan reaper's tracker
/// sees the job's process-group id.
#[derive(Debug, Clone, PartialEq)]
pub struct Update<M = Meta> {
    /// Update classification.
    pub status: Status,
    /// Batch index of the job (`0..N`).
    pub index: usize,
    /// Human-readable description of what was run.
    pub command: Arc<str>,
    /// Caller metadata.
    pub meta: M,
}

impl<M: Default> Update<M> {
    /// Creates an update with default metadata.
    pub fn new(status: Status, index: usize, command: impl Into<Arc<str>>) -> Self {
        Self {
            status,
            index,
            command: command.into(),
            meta: M::default(),
        }
    }
}

impl<M> Update<M> {
    /// Replaces the metadata (may change its type).
    #[inline]
    pub fn with_meta<N>(self, meta: N) -> Update<N> {
        Update {
            status: self.status,
            index: self.index,
            command: self.command,
            meta,
        }
    }

    /// True for terminal statuses.
    #[inline]
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Item travelling on the update channel.
#[derive(Debug, Clone, PartialEq)]
pub enum Message<M = Meta> {
    /// A lifecycle update.
    Update(Update<M>),
    /// Control value: the consumer stops waiting.
    Sentinel,
}

impl<M> From<Update<M>> for Message<M> {
    fn from(up: Update<M>) -> Self {
        Message::Update(up)
    }
}
