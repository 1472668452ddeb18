//! Completion counter.

use std::sync::atomic::{AtomicUsize, Ordering};

use super::progress::ProgressObserver;

/// Point-in-time copy of a [`CountObserver`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counts {
    pub started: usize,
    pub finished: usize,
    pub interrupted: usize,
    pub failed: usize,
}

impl Counts {
    /// Jobs that reached any terminal callback.
    pub fn settled(&self) -> usize {
        self.finished + self.interrupted + self.failed
    }
}

/// Counts job callbacks; never asks for reloads.
#[derive(Debug, Default)]
pub struct CountObserver {
    started: AtomicUsize,
    finished: AtomicUsize,
    interrupted: AtomicUsize,
    failed: AtomicUsize,
}

impl CountObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Counts {
        Counts {
            started: self.started.load(Ordering::Relaxed),
            finished: self.finished.load(Ordering::Relaxed),
            interrupted: self.interrupted.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

impl<E> ProgressObserver<E> for CountObserver {
    fn job_started(&self, _index: usize, _experiment: &E) {
        self.started.fetch_add(1, Ordering::Relaxed);
    }

    fn job_finished(&self, _index: usize, _experiment: &E) {
        self.finished.fetch_add(1, Ordering::Relaxed);
    }

    fn job_interrupted(&self, _index: usize, _experiment: &E) {
        self.interrupted.fetch_add(1, Ordering::Relaxed);
    }

    fn job_failed(&self, _index: usize, _experiment: &E) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    fn auto_reload(&self) -> bool {
        false
    }

    fn name(&self) -> &'static str {
        "count"
    }
}
