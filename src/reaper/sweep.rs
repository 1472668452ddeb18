//! # Orphan sweep.
//!
//! Terminates every process group the log still lists as running. All survivors get
//! `SIGTERM` at once, share one grace period, and whoever is left gets `SIGKILL`.

use std::io;
use std::path::Path;
use std::time::{Duration, Instant};

use nix::sys::signal::Signal;

use super::log::replay;
use crate::dispatch::terminate::{Delivery, group_alive, signal_group};

const POLL: Duration = Duration::from_millis(25);

/// What a sweep found and did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Process groups listed as running when the sweep started.
    pub survivors: Vec<u32>,
    /// Groups that received `SIGTERM`.
    pub signalled: usize,
    /// Groups already gone.
    pub gone: usize,
    /// Groups we were not permitted to signal.
    pub denied: usize,
    /// Groups that needed `SIGKILL` after the grace period.
    pub killed: usize,
}

impl SweepReport {
    /// True when nothing was left to terminate.
    pub fn is_clean(&self) -> bool {
        self.survivors.is_empty()
    }
}

/// Replays the log at `path` and terminates its survivors. Blocks up to `grace`.
pub fn sweep_log(path: &Path, grace: Duration) -> io::Result<SweepReport> {
    let survivors = replay(path)?;
    Ok(sweep(survivors, grace))
}

/// Terminates the given process groups. Blocks up to `grace`.
pub fn sweep(survivors: impl IntoIterator<Item = u32>, grace: Duration) -> SweepReport {
    let mut report = SweepReport {
        survivors: survivors.into_iter().collect(),
        ..SweepReport::default()
    };
    if report.survivors.is_empty() {
        return report;
    }

    let mut pending = Vec::new();
    for &pgid in &report.survivors {
        match signal_group(pgid, Signal::SIGTERM) {
            Delivery::Delivered => {
                report.signalled += 1;
                pending.push(pgid);
            }
            Delivery::Gone => report.gone += 1,
            Delivery::Denied => report.denied += 1,
        }
    }

    let deadline = Instant::now() + grace;
    while !pending.is_empty() && Instant::now() < deadline {
        pending.retain(|&pgid| group_alive(pgid));
        if !pending.is_empty() {
            std::thread::sleep(POLL);
        }
    }
    for pgid in pending {
        if group_alive(pgid) && signal_group(pgid, Signal::SIGKILL) == Delivery::Delivered {
            report.killed += 1;
        }
    }

    tracing::info!(
        survivors = report.survivors.len(),
        signalled = report.signalled,
        gone = report.gone,
        denied = report.denied,
        killed = report.killed,
        "orphan sweep finished"
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_log_is_clean() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reaper.log");
        std::fs::write(&path, "ADD 5\nREM 5\n").unwrap();
        let report = sweep_log(&path, Duration::from_millis(10)).unwrap();
        assert!(report.is_clean());
    }

    #[test]
    fn missing_log_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(sweep_log(&dir.path().join("absent.log"), Duration::ZERO).is_err());
    }
}
