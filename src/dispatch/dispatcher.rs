//! # Dispatcher: bounded worker pool for one batch at a time.
//!
//! [`Dispatcher::submit`] runs a batch of [`JobSpec`]s with at most
//! [`Config::worker_slots`] jobs at once and returns once every started job settled.
//!
//! ## Architecture
//! ```text
//! submit(jobs, sink, token)
//!   ├─ renumber jobs 0..N
//!   ├─ Reaper::start ──► tracker task (ADD/REM log)
//!   ├─ dispatch loop (index order):
//!   │     permit = select!{ token.cancelled() ─► stop, semaphore.acquire_owned() }
//!   │     JoinSet::spawn(run_job(ctx, job, token))      // permit held by the worker
//!   ├─ drain JoinSet
//!   │     cancelled? wait `3 × grace`, then abort stragglers
//!   │     aborted / panicked worker ─► dispatcher emits its terminal update
//!   ├─ Reaper::finish(interrupted) ─► sweep survivors when interrupted
//!   └─ interrupted? ─► Sentinel on sink
//! ```
//!
//! ## Rules
//! - Jobs start strictly in submission order (single loop, FIFO semaphore).
//! - Every spawned job yields exactly one terminal update.
//! - Jobs still queued when the token is cancelled are reported in
//!   [`BatchReport::unstarted`] and produce no update.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use super::shutdown::SignalListener;
use super::spec::{FunctionCall, JobSpec};
use super::worker::{JobResult, WorkerCtx, run_job};
use crate::bus::{Expect, Meta, Relay, RelayStats, Status, Update, UpdateObserver, UpdateSink, channel};
use crate::config::Config;
use crate::error::DispatchError;
use crate::reaper::{Reaper, SweepReport};

/// Summary of one batch.
#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    /// One result per spawned job, sorted by index.
    pub results: Vec<JobResult>,
    /// Indices that never got a worker slot.
    pub unstarted: Vec<usize>,
    /// True when the batch token was cancelled.
    pub interrupted: bool,
    /// Orphan sweep performed after an interrupt.
    pub swept: Option<SweepReport>,
    /// Relay counters (observed batches only).
    pub relay: Option<RelayStats>,
}

impl BatchReport {
    /// Terminal status of the job at `index`, if it was spawned.
    pub fn status(&self, index: usize) -> Option<Status> {
        self.results
            .binary_search_by_key(&index, |r| r.index)
            .ok()
            .map(|pos| self.results[pos].status)
    }

    /// Number of jobs that settled with `status`.
    pub fn count(&self, status: Status) -> usize {
        self.results.iter().filter(|r| r.status == status).count()
    }
}

/// Runs batches of jobs under one [`Config`].
///
/// ## Example
/// ```rust,no_run
/// use std::time::Duration;
/// use jobvisor::{Config, Dispatcher, JobSpec, Status};
/// use tokio_util::sync::CancellationToken;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let dispatcher = Dispatcher::new(Config { concurrency: 2, ..Config::default() });
///     let jobs = vec![
///         JobSpec::shell("sleep 0.1"),
///         JobSpec::shell("sleep 5").with_timeout(Some(Duration::from_millis(500))),
///         JobSpec::shell("true"),
///     ];
///     let report = dispatcher.submit(jobs, None, &CancellationToken::new()).await?;
///     assert_eq!(report.status(1), Some(Status::Timeout));
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct Dispatcher {
    cfg: Arc<Config>,
}

impl Dispatcher {
    /// Creates a dispatcher.
    pub fn new(cfg: Config) -> Self {
        Self { cfg: Arc::new(cfg) }
    }

    /// The configuration batches run under.
    pub fn config(&self) -> &Config {
        &self.cfg
    }

    /// Runs `jobs` and returns once every started job settled.
    ///
    /// Updates go to `sink` when given. Jobs are renumbered `0..N` in the given order.
    pub async fn submit(
        &self,
        jobs: Vec<JobSpec>,
        sink: Option<UpdateSink>,
        token: &CancellationToken,
    ) -> Result<BatchReport, DispatchError> {
        let total = jobs.len();
        let slots = self.cfg.worker_slots();
        let reaper = Reaper::start(self.cfg.reaper_dir.as_deref(), self.cfg.grace)
            .map_err(DispatchError::ReaperLog)?;
        let _signals = self
            .cfg
            .handle_signals
            .then(|| SignalListener::install(token.clone()))
            .flatten();
        tracing::info!(jobs = total, slots, "batch started");

        let ctx = WorkerCtx {
            cfg: self.cfg.clone(),
            sink: sink.clone(),
            tracker: Some(reaper.sink()),
        };
        let semaphore = Arc::new(Semaphore::new(slots));
        let mut set = JoinSet::new();
        let mut running: HashMap<tokio::task::Id, (usize, Arc<str>, Meta)> = HashMap::new();
        let mut unstarted = Vec::new();

        let mut queue = jobs
            .into_iter()
            .enumerate()
            .map(|(index, job)| job.with_index(index));
        while let Some(job) = queue.next() {
            let Some(permit) = acquire(&semaphore, token).await else {
                unstarted.push(job.index());
                unstarted.extend(queue.by_ref().map(|job| job.index()));
                tracing::info!(unstarted = unstarted.len(), "batch interrupted; dispatch stopped");
                break;
            };
            let entry = (job.index(), job.payload().describe(), job.meta().clone());
            let ctx = ctx.clone();
            let token = token.clone();
            let handle = set.spawn(async move {
                let _permit = permit;
                run_job(ctx, job, token).await
            });
            running.insert(handle.id(), entry);
        }
        drop(ctx);

        let mut results = Vec::with_capacity(total);
        let grace = self.cfg.grace;
        let stall = async {
            token.cancelled().await;
            sleep(grace.saturating_mul(3)).await;
        };
        tokio::pin!(stall);
        let mut aborted = false;
        loop {
            tokio::select! {
                next = set.join_next_with_id() => match next {
                    None => break,
                    Some(Ok((id, result))) => {
                        running.remove(&id);
                        results.push(result);
                    }
                    Some(Err(err)) => {
                        let Some((index, command, meta)) = running.remove(&err.id()) else {
                            continue;
                        };
                        let status = if err.is_cancelled() {
                            Status::Timeout
                        } else {
                            Status::Failed
                        };
                        tracing::error!(index, error = %err, "worker ended without settling its job");
                        if let Some(sink) = &sink {
                            sink.publish(Update {
                                status,
                                index,
                                command: command.clone(),
                                meta,
                            });
                        }
                        results.push(JobResult::without_process(index, command, status));
                    }
                },
                _ = &mut stall, if !aborted => {
                    tracing::warn!(running = set.len(), "workers did not settle within grace; aborting");
                    set.abort_all();
                    aborted = true;
                }
            }
        }

        let interrupted = token.is_cancelled();
        let swept = reaper.finish(interrupted).await;
        if interrupted {
            if let Some(sink) = &sink {
                sink.sentinel();
            }
        }

        results.sort_by_key(|r| r.index);
        let report = BatchReport {
            results,
            unstarted,
            interrupted,
            swept,
            relay: None,
        };
        tracing::info!(
            jobs = total,
            done = report.count(Status::Done),
            timed_out = report.count(Status::Timeout),
            failed = report.count(Status::Failed),
            unstarted = report.unstarted.len(),
            interrupted,
            "batch finished"
        );
        Ok(report)
    }

    /// Runs `jobs` and delivers their updates to `observers` through a [`Relay`].
    ///
    /// Malformed update traffic interrupts the batch and is returned as
    /// [`DispatchError::Bus`].
    pub async fn run_observed(
        &self,
        jobs: Vec<JobSpec>,
        observers: Vec<Arc<dyn UpdateObserver>>,
        token: &CancellationToken,
    ) -> Result<BatchReport, DispatchError> {
        let batch = token.child_token();
        let (sink, stream) = channel();
        let relay = Relay::new(observers);
        let expected = jobs.len();
        let on_fault = batch.clone();
        let relay_task = tokio::spawn(async move {
            let res = relay.drain(stream, Expect::Count(expected)).await;
            if let Err(err) = &res {
                tracing::error!(error = %err, "update bus failed; interrupting batch");
                on_fault.cancel();
            }
            res
        });

        let mut report = self.submit(jobs, Some(sink), &batch).await?;
        match relay_task.await {
            Ok(Ok(stats)) => {
                report.relay = Some(stats);
                Ok(report)
            }
            Ok(Err(err)) => Err(DispatchError::Bus(err)),
            Err(err) => Err(DispatchError::RelayDied {
                reason: err.to_string(),
            }),
        }
    }

    /// Runs a single job outside any batch: no updates, no reaper.
    pub async fn run_one(&self, job: JobSpec) -> JobResult {
        let ctx = WorkerCtx::detached(self.cfg.clone());
        run_job(ctx, job.with_index(0), CancellationToken::new()).await
    }
}

async fn acquire(semaphore: &Arc<Semaphore>, token: &CancellationToken) -> Option<OwnedSemaphorePermit> {
    tokio::select! {
        biased;
        _ = token.cancelled() => None,
        permit = semaphore.clone().acquire_owned() => permit.ok(),
    }
}

/// Runs a shell command with captured output.
///
/// ## Example
/// ```rust,no_run
/// # #[tokio::main]
/// # async fn main() {
/// let out = jobvisor::run_command("echo hello", None).await;
/// assert_eq!(out.stdout.as_deref(), Some("hello\n"));
/// # }
/// ```
pub async fn run_command(command: impl Into<String>, timeout: Option<Duration>) -> JobResult {
    let job = JobSpec::shell(command)
        .with_timeout(timeout)
        .with_capture(true);
    Dispatcher::new(Config::default()).run_one(job).await
}

/// Runs a registered function in an isolated process of the current executable, with
/// captured output.
pub async fn run_function(call: FunctionCall, timeout: Option<Duration>) -> JobResult {
    let job = JobSpec::function(call)
        .with_timeout(timeout)
        .with_capture(true);
    Dispatcher::new(Config::default()).run_one(job).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dispatcher(concurrency: usize) -> Dispatcher {
        Dispatcher::new(Config {
            concurrency,
            grace: Duration::from_millis(200),
            ..Config::default()
        })
    }

    #[tokio::test]
    async fn empty_batch_settles_immediately() {
        let report = dispatcher(2)
            .submit(Vec::new(), None, &CancellationToken::new())
            .await
            .unwrap();
        assert!(report.results.is_empty());
        assert!(!report.interrupted);
        assert!(report.swept.is_none());
    }

    #[tokio::test]
    async fn cancelled_batch_lists_unstarted_jobs() {
        let token = CancellationToken::new();
        let jobs = vec![
            JobSpec::shell("sleep 5"),
            JobSpec::shell("sleep 5"),
            JobSpec::shell("true"),
        ];
        let d = dispatcher(1);
        let cancel = token.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(150)).await;
            cancel.cancel();
        });
        let report = d.submit(jobs, None, &token).await.unwrap();

        assert!(report.interrupted);
        assert_eq!(report.status(0), Some(Status::Timeout));
        assert_eq!(report.unstarted, vec![1, 2]);
        assert!(report.swept.is_some());
    }

    #[tokio::test]
    async fn run_command_captures_output() {
        let out = run_command("printf out; printf err >&2; exit 4", None).await;
        assert_eq!(out.status, Status::Failed);
        assert_eq!(out.exit_code, Some(4));
        assert_eq!(out.stdout.as_deref(), Some("out"));
        assert_eq!(out.stderr.as_deref(), Some("err"));
    }
}
