//! Error types used by the jobvisor runtime, its bus and its collaborators.
//!
//! - [`DispatchError`] failures of the dispatch machinery itself (not of jobs).
//! - [`BusError`] malformed traffic on the update bus (fatal to the relay).
//! - [`FanoutError`] misuse of a [`Fanout`](crate::Fanout).
//! - [`ObserverError`] raised by observers; logged by the relay, never fatal.
//! - [`StorageError`] raised by the storage collaborator.
//! - [`RunError`] failures of a [`Runner`](crate::Runner) invocation.
//!
//! Each type provides `as_label` (stable snake_case label for logs/metrics).
//!
//! Job failures and timeouts are **not** errors at this level: they are outcomes,
//! reported as [`Status::Failed`](crate::Status::Failed) / [`Status::Timeout`](crate::Status::Timeout).

use std::io;

use thiserror::Error;

/// # Errors produced by the dispatcher.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum DispatchError {
    /// The orphan reaper log could not be created, written or read.
    #[error("reaper log: {0}")]
    ReaperLog(#[source] io::Error),

    /// The update relay observed malformed traffic.
    #[error("update bus: {0}")]
    Bus(#[from] BusError),

    /// The relay task panicked or was aborted.
    #[error("relay task died: {reason}")]
    RelayDied {
        /// Join error description.
        reason: String,
    },
}

impl DispatchError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use jobvisor::{BusError, DispatchError};
    ///
    /// let err = DispatchError::from(BusError::UnknownIndex { index: 7, expected: 3 });
    /// assert_eq!(err.as_label(), "dispatch_bus");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            DispatchError::ReaperLog(_) => "dispatch_reaper_log",
            DispatchError::Bus(_) => "dispatch_bus",
            DispatchError::RelayDied { .. } => "dispatch_relay_died",
        }
    }
}

/// # Malformed update traffic.
///
/// Any of these means a producer violated the bus protocol; the relay stops immediately.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BusError {
    /// An update carried an index outside `0..expected`.
    #[error("update for index {index} outside batch of {expected}")]
    UnknownIndex {
        /// Offending index.
        index: usize,
        /// Batch size the relay was draining for.
        expected: usize,
    },

    /// A second terminal update arrived for the same index.
    #[error("second terminal update for index {index}")]
    DuplicateTerminal {
        /// Offending index.
        index: usize,
    },

    /// A started update arrived after the index already settled.
    #[error("started update for index {index} after it settled")]
    StartedAfterTerminal {
        /// Offending index.
        index: usize,
    },
}

impl BusError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            BusError::UnknownIndex { .. } => "bus_unknown_index",
            BusError::DuplicateTerminal { .. } => "bus_duplicate_terminal",
            BusError::StartedAfterTerminal { .. } => "bus_started_after_terminal",
        }
    }
}

/// # Fan-out misuse.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FanoutError {
    /// `remove` was called with a subscriber that is not registered.
    #[error("subscriber not registered")]
    NotFound,
}

/// # Error raised by an observer callback.
///
/// The relay logs it and keeps delivering; it never aborts a batch.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ObserverError {
    /// Re-fetching a domain object failed.
    #[error("reload failed: {0}")]
    Reload(#[from] StorageError),

    /// Anything else the observer wants to report.
    #[error("{0}")]
    Other(String),
}

/// # Error raised by the storage collaborator.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum StorageError {
    /// The requested record does not exist.
    #[error("record {id} not found")]
    NotFound {
        /// Requested identifier.
        id: u64,
    },

    /// Backend failure.
    #[error("storage backend: {0}")]
    Backend(String),
}

impl StorageError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            StorageError::NotFound { .. } => "storage_not_found",
            StorageError::Backend(_) => "storage_backend",
        }
    }
}

/// # Errors produced by a runner invocation.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum RunError {
    /// Storage collaborator failed (run counter, lookup, save or reload).
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// The dispatcher failed.
    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    /// The batch was cancelled; the listed trajectory positions never got a worker slot.
    #[error("batch interrupted; {} job(s) never started", unstarted.len())]
    Interrupted {
        /// Trajectory positions that were never started.
        unstarted: Vec<usize>,
    },
}

impl RunError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use jobvisor::RunError;
    ///
    /// let err = RunError::Interrupted { unstarted: vec![2, 3] };
    /// assert_eq!(err.as_label(), "run_interrupted");
    /// assert_eq!(err.to_string(), "batch interrupted; 2 job(s) never started");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            RunError::Storage(_) => "run_storage",
            RunError::Dispatch(_) => "run_dispatch",
            RunError::Interrupted { .. } => "run_interrupted",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bus_errors_are_labeled() {
        assert_eq!(
            BusError::DuplicateTerminal { index: 1 }.as_label(),
            "bus_duplicate_terminal"
        );
        assert_eq!(
            BusError::StartedAfterTerminal { index: 1 }.to_string(),
            "started update for index 1 after it settled"
        );
    }

    #[test]
    fn storage_error_converts_into_run_error() {
        let err: RunError = StorageError::NotFound { id: 4 }.into();
        assert_eq!(err.as_label(), "run_storage");
        assert_eq!(err.to_string(), "record 4 not found");
    }
}
