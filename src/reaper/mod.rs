//! # Orphan reaper.
//!
//! Guarantees that an interrupted batch leaves no job process groups behind.
//!
//! ## Architecture
//! ```text
//! workers ── Update<pgid> ──► UpdateSink<u32> ──► tracker task ──► reaper log (ADD/REM)
//!
//! Reaper::finish(interrupted)
//!   ├─ Sentinel ─► tracker flushes and exits (aborted after `grace`)
//!   ├─ interrupted? ─► replay log ─► sweep survivors (SIGTERM → grace → SIGKILL)
//!   └─ delete log
//!
//! Reaper dropped before finish ─► abort tracker ─► live groups + queued updates ─► sweep
//! ```
//!
//! ## Rules
//! - The log is append-only; one flushed line per entry.
//! - A normal finish deletes the log without sweeping.
//! - Dropping an unfinished reaper always sweeps, including groups whose `Started` was
//!   still queued for the tracker.

mod log;
mod sweep;
mod tracker;

use std::io;
use std::path::Path;
use std::time::Duration;

use tempfile::TempPath;
use tokio::runtime::{Handle, RuntimeFlavor};
use tokio::task::JoinHandle;
use tokio::time::timeout;

use crate::bus::{UpdateSink, channel};
use tracker::{Inbox, SharedInbox};

pub use log::{Entry, ReaperLog, replay, survivors};
pub use sweep::{SweepReport, sweep, sweep_log};

/// Per-batch orphan reaper: tracker task plus sweep guard.
#[derive(Debug)]
pub struct Reaper {
    sink: UpdateSink<u32>,
    guard: SweepGuard,
}

#[derive(Debug)]
struct SweepGuard {
    path: Option<TempPath>,
    tracker: Option<JoinHandle<()>>,
    inbox: SharedInbox,
    grace: Duration,
}

impl Drop for SweepGuard {
    fn drop(&mut self) {
        let Some(path) = self.path.take() else {
            return;
        };
        if let Some(handle) = self.tracker.take() {
            handle.abort();
        }
        tracing::warn!(path = %path.display(), "batch dropped before completion; sweeping orphans");
        let live = tracker::lock(&self.inbox).settle();
        let grace = self.grace;
        let on_worker = Handle::try_current()
            .map(|h| h.runtime_flavor() == RuntimeFlavor::MultiThread)
            .unwrap_or(false);
        if on_worker {
            tokio::task::block_in_place(|| sweep(live, grace));
        } else {
            sweep(live, grace);
        }
    }
}

impl Reaper {
    /// Creates the log in `dir` (system temp dir when `None`) and starts the tracker.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(dir: Option<&Path>, grace: Duration) -> io::Result<Self> {
        let (log, path) = ReaperLog::create(dir)?;
        tracing::debug!(path = %log.path().display(), "reaper log created");
        let (sink, stream) = channel();
        let inbox = Inbox::shared(stream);
        let tracker = tracker::spawn(log, inbox.clone());
        Ok(Self {
            sink,
            guard: SweepGuard {
                path: Some(path),
                tracker: Some(tracker),
                inbox,
                grace,
            },
        })
    }

    /// Sink workers publish process-group updates to.
    pub fn sink(&self) -> UpdateSink<u32> {
        self.sink.clone()
    }

    /// Location of the log while the reaper is live.
    pub fn path(&self) -> Option<&Path> {
        self.guard.path.as_deref()
    }

    /// Stops the tracker, sweeps survivors when `interrupted`, and deletes the log.
    pub async fn finish(mut self, interrupted: bool) -> Option<SweepReport> {
        let grace = self.guard.grace;
        self.sink.sentinel();
        if let Some(mut handle) = self.guard.tracker.take() {
            if timeout(grace, &mut handle).await.is_err() {
                tracing::warn!("reaper tracker did not stop in time; aborting");
                handle.abort();
            }
        }

        let path = self.guard.path.take()?;
        let report = if interrupted {
            let log = path.to_path_buf();
            match tokio::task::spawn_blocking(move || sweep_log(&log, grace)).await {
                Ok(Ok(report)) => Some(report),
                Ok(Err(err)) => {
                    tracing::error!(path = %path.display(), error = %err, "orphan sweep failed");
                    None
                }
                Err(err) => {
                    tracing::error!(error = %err, "orphan sweep task died");
                    None
                }
            }
        } else {
            None
        };

        if let Err(err) = path.close() {
            tracing::debug!(error = %err, "removing reaper log");
        }
        report
    }
}
