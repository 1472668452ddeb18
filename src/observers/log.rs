//! # Logging observer for debugging and demos.
//!
//! [`LogObserver`] reports run and job progress through `tracing`.
//!
//! ## Output (fmt subscriber)
//! ```text
//! INFO run started trajectory="sweep" run_id=Some(4) host="lab-1" jobs=3
//! INFO job started index=0 kind="fit" id=Some(17)
//! INFO job finished index=0 kind="fit" id=Some(17)
//! WARN job interrupted index=1 kind="fit" id=Some(18)
//! INFO run finished trajectory="sweep" run_id=Some(4)
//! ```

use super::progress::ProgressObserver;
use crate::runner::BatchStamp;
use crate::storage::Experiment;

/// Tracing-backed progress observer.
///
/// Enabled via the `logging` feature. Not intended for production use; implement a
/// custom [`ProgressObserver`] for structured reporting.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogObserver;

impl<E: Experiment> ProgressObserver<E> for LogObserver {
    fn run_started(&self, name: &str, stamp: &BatchStamp, count: usize) {
        tracing::info!(
            trajectory = name,
            run_id = ?stamp.run_id,
            host = %stamp.host,
            date = %stamp.started_at.format("%Y-%m-%d %H:%M:%S"),
            jobs = count,
            "run started"
        );
    }

    fn job_started(&self, index: usize, experiment: &E) {
        tracing::info!(index, kind = experiment.kind(), id = ?experiment.identifier(), "job started");
    }

    fn job_finished(&self, index: usize, experiment: &E) {
        tracing::info!(index, kind = experiment.kind(), id = ?experiment.identifier(), "job finished");
    }

    fn job_interrupted(&self, index: usize, experiment: &E) {
        tracing::warn!(index, kind = experiment.kind(), id = ?experiment.identifier(), "job interrupted");
    }

    fn job_failed(&self, index: usize, experiment: &E) {
        tracing::error!(index, kind = experiment.kind(), id = ?experiment.identifier(), "job failed");
    }

    fn run_finished(&self, name: &str, stamp: &BatchStamp) {
        tracing::info!(trajectory = name, run_id = ?stamp.run_id, "run finished");
    }

    fn auto_reload(&self) -> bool {
        false
    }

    fn name(&self) -> &'static str {
        "log"
    }
}
