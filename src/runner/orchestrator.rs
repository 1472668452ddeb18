//! # Runner: trajectory in, settled experiments out.
//!
//! ## Flow of [`Runner::run`]
//! ```text
//! Storage::new_run ─► BatchStamp (run_id, host, now, group = trajectory name)
//!   for (setting, e) in trajectory:
//!       Deduplicator::find ── match ─► e.set_identifier(id)   (SkippedExisting, not run)
//!                          └─ none ──► submitted
//!   observers.run_started(name, stamp, submitted.len())
//!   for e in submitted: e.stamp(stamp); Storage::save(e); JobSpec::new(e.payload())
//!   Dispatcher::run_observed(jobs, [ProgressAdapter]) ─► job_* callbacks
//!   observers.run_finished(name, stamp)
//!   reload every experiment with an identifier ─► RunReport
//! ```
//!
//! ## Rules
//! - Storage failures before dispatch abort the run ([`RunError::Storage`]).
//! - An interrupted batch returns [`RunError::Interrupted`] after `run_finished`.

use std::sync::Arc;

use serde_json::json;
use tokio_util::sync::CancellationToken;

use super::adapter::ProgressAdapter;
use super::dedup::Deduplicator;
use super::stamp::BatchStamp;
use crate::bus::{Status, UpdateObserver};
use crate::config::Config;
use crate::dispatch::{BatchReport, Dispatcher, JobSpec};
use crate::error::RunError;
use crate::fanout::Fanout;
use crate::observers::ProgressObserver;
use crate::storage::{Experiment, RecordId, Storage, Trajectory};

/// What happened to one trajectory entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// A stored record already covered the setting; the job was not run.
    SkippedExisting {
        /// Record the experiment was rebound to.
        id: RecordId,
    },
    /// The job ran and settled with this status.
    Settled(Status),
    /// The batch was interrupted before the job got a worker slot.
    Unstarted,
}

/// Outcome of [`Runner::run`].
#[derive(Debug, Clone)]
pub struct RunReport<E> {
    /// Trajectory name.
    pub name: String,
    /// Batch metadata stamped onto every submitted experiment.
    pub stamp: BatchStamp,
    /// Experiments in trajectory order (rebound, saved or reloaded).
    pub experiments: Vec<E>,
    /// One entry per trajectory position.
    pub dispositions: Vec<Disposition>,
    /// Dispatcher report of the submitted jobs (batch index = submission order).
    pub batch: BatchReport,
}

impl<E> RunReport<E> {
    /// Entries with the given disposition.
    pub fn count(&self, disposition: Disposition) -> usize {
        self.dispositions.iter().filter(|d| **d == disposition).count()
    }

    /// Entries skipped because a stored record covered them.
    pub fn skipped(&self) -> usize {
        self.dispositions
            .iter()
            .filter(|d| matches!(d, Disposition::SkippedExisting { .. }))
            .count()
    }
}

/// Builder for [`Runner`].
pub struct RunnerBuilder<E: Experiment> {
    cfg: Config,
    storage: Option<Arc<dyn Storage<E>>>,
    observers: Vec<Arc<dyn ProgressObserver<E>>>,
    repeat: bool,
    group: Option<String>,
}

impl<E: Experiment> RunnerBuilder<E> {
    /// Sets the storage used for run numbers, dedup, saving and reloading.
    pub fn with_storage(mut self, storage: Arc<dyn Storage<E>>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Adds a progress observer (called in registration order).
    pub fn with_observer(mut self, observer: Arc<dyn ProgressObserver<E>>) -> Self {
        self.observers.push(observer);
        self
    }

    /// Re-run settings that already have a stored record (default `false`).
    pub fn repeat(mut self, repeat: bool) -> Self {
        self.repeat = repeat;
        self
    }

    /// Storage group dedup lookups are restricted to (default: the trajectory name).
    pub fn group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    pub fn build(self) -> Runner<E> {
        Runner {
            dispatcher: Dispatcher::new(self.cfg),
            storage: self.storage,
            observers: Arc::new(Fanout::with_subscribers(self.observers)),
            repeat: self.repeat,
            group: self.group,
        }
    }
}

/// Orchestrates deduplicated, stamped, observed batches of experiments.
///
/// ## Example
/// ```rust,no_run
/// use std::sync::Arc;
/// use jobvisor::{
///     BatchStamp, Config, CountObserver, Experiment, JobPayload, RecordId, Runner, Setting,
///     Trajectory,
/// };
/// use tokio_util::sync::CancellationToken;
///
/// #[derive(Clone)]
/// struct Sleep { secs: u32, id: Option<RecordId> }
///
/// impl Experiment for Sleep {
///     fn kind(&self) -> &str { "sleep" }
///     fn identifier(&self) -> Option<RecordId> { self.id }
///     fn set_identifier(&mut self, id: RecordId) { self.id = Some(id) }
///     fn stamp(&mut self, _stamp: &BatchStamp) {}
///     fn payload(&self) -> JobPayload { format!("sleep {}", self.secs).into() }
/// }
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let counts = Arc::new(CountObserver::new());
///     let runner = Runner::<Sleep>::builder(Config::default())
///         .with_observer(counts.clone())
///         .build();
///     let trajectory = Trajectory::new("naps")
///         .push(Setting::new().with("secs", 1), Sleep { secs: 1, id: None })
///         .push(Setting::new().with("secs", 2), Sleep { secs: 2, id: None });
///     runner.run(trajectory, &CancellationToken::new()).await?;
///     assert_eq!(counts.snapshot().finished, 2);
///     Ok(())
/// }
/// ```
pub struct Runner<E: Experiment> {
    dispatcher: Dispatcher,
    storage: Option<Arc<dyn Storage<E>>>,
    observers: Arc<Fanout<dyn ProgressObserver<E>>>,
    repeat: bool,
    group: Option<String>,
}

impl<E: Experiment> Runner<E> {
    /// Starts building a runner over `cfg`.
    pub fn builder(cfg: Config) -> RunnerBuilder<E> {
        RunnerBuilder {
            cfg,
            storage: None,
            observers: Vec::new(),
            repeat: false,
            group: None,
        }
    }

    /// Registered observers; may be changed between runs.
    pub fn observers(&self) -> &Fanout<dyn ProgressObserver<E>> {
        &self.observers
    }

    /// Dispatcher configuration.
    pub fn config(&self) -> &Config {
        self.dispatcher.config()
    }

    /// Runs every entry of `trajectory` not already covered by storage.
    pub async fn run(&self, trajectory: Trajectory<E>, token: &CancellationToken) -> Result<RunReport<E>, RunError> {
        let run_id = match &self.storage {
            Some(storage) => Some(storage.new_run().await?),
            None => None,
        };
        let name = trajectory.name;
        let group = self.group.clone().unwrap_or_else(|| name.clone());
        let stamp = BatchStamp::now(run_id, self.config().default_timeout()).with_group(group.clone());

        let mut dedup = Deduplicator::new(self.storage.clone(), self.repeat, Some(group));
        let mut experiments = Vec::with_capacity(trajectory.entries.len());
        let mut dispositions = Vec::with_capacity(trajectory.entries.len());
        let mut positions = Vec::new();
        for (pos, (setting, mut experiment)) in trajectory.entries.into_iter().enumerate() {
            match dedup.find(&setting, experiment.kind()).await? {
                Some(id) => {
                    tracing::info!(position = pos, id, "stored record found; skipping");
                    experiment.set_identifier(id);
                    dispositions.push(Disposition::SkippedExisting { id });
                }
                None => {
                    positions.push(pos);
                    dispositions.push(Disposition::Unstarted);
                }
            }
            experiments.push(experiment);
        }

        tracing::info!(
            trajectory = %name,
            run_id = ?stamp.run_id,
            host = %stamp.host,
            jobs = positions.len(),
            skipped = experiments.len() - positions.len(),
            "run started"
        );
        self.observers.run_started(&name, &stamp, positions.len());

        let mut jobs = Vec::with_capacity(positions.len());
        let mut submitted = Vec::with_capacity(positions.len());
        for &pos in &positions {
            let experiment = &mut experiments[pos];
            experiment.stamp(&stamp);
            if let Some(storage) = &self.storage {
                storage.save(experiment).await?;
            }
            jobs.push(
                JobSpec::new(experiment.payload())
                    .with_meta(json!({"position": pos, "identifier": experiment.identifier()})),
            );
            submitted.push(experiment.clone());
        }

        let adapter: Arc<dyn UpdateObserver> = Arc::new(ProgressAdapter::new(
            submitted,
            self.observers.clone(),
            self.storage.clone(),
        ));
        let batch = self
            .dispatcher
            .run_observed(jobs, vec![adapter], token)
            .await?;
        self.observers.run_finished(&name, &stamp);

        for (index, &pos) in positions.iter().enumerate() {
            if let Some(status) = batch.status(index) {
                dispositions[pos] = Disposition::Settled(status);
            }
        }
        self.reload_known(&mut experiments, &dispositions).await;

        if batch.interrupted {
            let unstarted = batch.unstarted.iter().map(|&i| positions[i]).collect();
            return Err(RunError::Interrupted { unstarted });
        }
        Ok(RunReport {
            name,
            stamp,
            experiments,
            dispositions,
            batch,
        })
    }

    /// Re-reads rebound and settled experiments so the report carries stored state.
    async fn reload_known(&self, experiments: &mut [E], dispositions: &[Disposition]) {
        let Some(storage) = &self.storage else {
            return;
        };
        for (experiment, disposition) in experiments.iter_mut().zip(dispositions) {
            if *disposition == Disposition::Unstarted || experiment.identifier().is_none() {
                continue;
            }
            match storage.reload(experiment).await {
                Ok(fresh) => *experiment = fresh,
                Err(err) => tracing::warn!(
                    id = ?experiment.identifier(),
                    error = %err,
                    "reload after run failed; keeping in-memory copy"
                ),
            }
        }
    }
}
