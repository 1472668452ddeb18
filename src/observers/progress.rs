//! # Domain progress callbacks.
//!
//! [`ProgressObserver`] is the callback set a [`Runner`](crate::Runner) reports to, in
//! terms of the caller's experiments rather than raw updates.
//!
//! ## Callback order for one run
//! ```text
//! run_started(name, stamp, count)
//!   job_started(i, e)        (per started job)
//!   job_finished(i, e)  |  job_interrupted(i, e)  |  job_failed(i, e)
//! run_finished(name, stamp)
//! ```
//!
//! A [`Fanout`] of observers is itself an observer, so lists of observers nest. A panic in
//! one member is caught and logged; the members after it still get the callback.

use std::panic::{AssertUnwindSafe, catch_unwind};

use crate::bus::panic_message;
use crate::fanout::Fanout;
use crate::runner::BatchStamp;

/// Callbacks describing the progress of a run.
///
/// Every method defaults to a no-op. Callbacks are synchronous and run on the relay
/// task: keep them short.
pub trait ProgressObserver<E>: Send + Sync + 'static {
    /// A run with `count` jobs to execute is starting.
    fn run_started(&self, _name: &str, _stamp: &BatchStamp, _count: usize) {}

    /// The job at batch index `index` started.
    fn job_started(&self, _index: usize, _experiment: &E) {}

    /// The job finished successfully.
    fn job_finished(&self, _index: usize, _experiment: &E) {}

    /// The job hit its timeout or the batch was interrupted.
    fn job_interrupted(&self, _index: usize, _experiment: &E) {}

    /// The job failed.
    fn job_failed(&self, _index: usize, _experiment: &E) {}

    /// The run is over.
    fn run_finished(&self, _name: &str, _stamp: &BatchStamp) {}

    /// Whether finished and failed experiments are re-read from storage before the
    /// callback.
    fn auto_reload(&self) -> bool {
        true
    }

    /// Observer name used in logs.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

impl<E: 'static> Fanout<dyn ProgressObserver<E>> {
    fn notify<F>(&self, callback: &'static str, f: F)
    where
        F: Fn(&dyn ProgressObserver<E>),
    {
        self.emit(|obs| {
            if let Err(panic) = catch_unwind(AssertUnwindSafe(|| f(obs))) {
                tracing::error!(
                    observer = obs.name(),
                    callback,
                    panic = %panic_message(&*panic),
                    "progress observer panicked"
                );
            }
        });
    }
}

impl<E: 'static> ProgressObserver<E> for Fanout<dyn ProgressObserver<E>> {
    fn run_started(&self, name: &str, stamp: &BatchStamp, count: usize) {
        self.notify("run_started", |obs| obs.run_started(name, stamp, count));
    }

    fn job_started(&self, index: usize, experiment: &E) {
        self.notify("job_started", |obs| obs.job_started(index, experiment));
    }

    fn job_finished(&self, index: usize, experiment: &E) {
        self.notify("job_finished", |obs| obs.job_finished(index, experiment));
    }

    fn job_interrupted(&self, index: usize, experiment: &E) {
        self.notify("job_interrupted", |obs| obs.job_interrupted(index, experiment));
    }

    fn job_failed(&self, index: usize, experiment: &E) {
        self.notify("job_failed", |obs| obs.job_failed(index, experiment));
    }

    fn run_finished(&self, name: &str, stamp: &BatchStamp) {
        self.notify("run_finished", |obs| obs.run_finished(name, stamp));
    }

    /// True when any member wants reloaded experiments.
    fn auto_reload(&self) -> bool {
        self.snapshot().iter().any(|obs| obs.auto_reload())
    }

    fn name(&self) -> &'static str {
        "fanout"
    }
}
