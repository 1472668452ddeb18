//! # jobvisor
//!
//! **Jobvisor** runs batches of independent jobs (shell commands or isolated function
//! calls) on a bounded worker pool, with per-job timeouts that terminate the job's whole
//! process group, an orphan reaper that cleans up after interrupted batches, and
//! resumable runs that skip work already recorded in storage.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!   Trajectory [(Setting, E), ...]
//!        │
//!        ▼
//! ┌──────────────────────────────────────────────────────────────────┐
//! │  Runner                                                          │
//! │  - Storage::new_run ─► BatchStamp (run_id, host, time)           │
//! │  - Deduplicator (skip settings already stored)                   │
//! │  - stamp + save, E::payload() ─► JobSpec                         │
//! └──────┬───────────────────────────────────────────────────────────┘
//!        ▼
//! ┌──────────────────────────────────────────────────────────────────┐
//! │  Dispatcher (FIFO semaphore, one tokio task per running job)     │
//! └──────┬────────────────────┬────────────────────┬─────────────────┘
//!        ▼                    ▼                    ▼
//!    worker #0            worker #1            worker #N
//!    (process group)      (process group)      (process group)
//!        │ Update<Meta>        │                    │
//!        ├────────────────────┴──────────┬─────────┘
//!        │                               │ Update<pgid>
//!        ▼                               ▼
//!   UpdateSink ─► Relay             Reaper tracker ─► ADD/REM log
//!                  │                                   │ (interrupt)
//!                  ▼                                   ▼
//!            ProgressAdapter                      orphan sweep
//!                  │
//!                  ▼
//!     Fanout<dyn ProgressObserver<E>>
//! ```
//!
//! ### Job lifecycle
//! ```text
//! queued ──► permit ──► spawn ──► Started ──► Done | Failed | Timeout
//!   │                    └─ spawn error ──────► Failed
//!   └─ batch cancelled ─► unstarted (no update)
//! ```
//!
//! ## Features
//! | Area              | Description                                                       | Key types / traits                          |
//! |-------------------|-------------------------------------------------------------------|---------------------------------------------|
//! | **Dispatch**      | Bounded pool, timeouts, process-group termination.                | [`Dispatcher`], [`JobSpec`], [`BatchReport`]|
//! | **Function jobs** | Registered functions executed in a re-executed child process.     | [`FunctionTable`], [`FunctionCall`]         |
//! | **Update bus**    | Lifecycle updates, relay, fan-out.                                | [`Update`], [`Relay`], [`Fanout`]           |
//! | **Reaper**        | Orphan tracking and sweep after interrupts.                       | [`Reaper`], [`SweepReport`]                 |
//! | **Runner**        | Dedup, stamping, storage, domain callbacks.                       | [`Runner`], [`ProgressObserver`]            |
//! | **Errors**        | Typed errors for dispatch, bus, storage and runs.                 | [`DispatchError`], [`RunError`]             |
//! | **Configuration** | Centralized runtime settings.                                     | [`Config`]                                  |
//!
//! ## Optional features
//! - `logging`: exports a simple built-in `LogObserver` _(demo/reference only)_.
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use jobvisor::{Config, Dispatcher, JobSpec, Status};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let cfg = Config {
//!         concurrency: 2,
//!         grace: Duration::from_millis(200),
//!         ..Config::default()
//!     };
//!     let jobs = vec![
//!         JobSpec::shell("true"),
//!         JobSpec::shell("sleep 5").with_timeout(Some(Duration::from_millis(100))),
//!         JobSpec::shell("exit 1"),
//!     ];
//!     let report = Dispatcher::new(cfg)
//!         .submit(jobs, None, &CancellationToken::new())
//!         .await?;
//!
//!     assert_eq!(report.status(0), Some(Status::Done));
//!     assert_eq!(report.status(1), Some(Status::Timeout));
//!     assert_eq!(report.status(2), Some(Status::Failed));
//!     Ok(())
//! }
//! ```

mod bus;
mod config;
mod dispatch;
mod error;
mod fanout;
mod observers;
mod reaper;
mod runner;
mod storage;

// ---- Public re-exports ----

pub use bus::{Expect, Message, Meta, Relay, RelayStats, Status, Update, UpdateObserver};
pub use bus::{UpdateSink, UpdateStream, channel};
pub use config::{Config, FunctionHost};
pub use dispatch::{BatchReport, Dispatcher, JobResult, run_command, run_function};
pub use dispatch::{CALL_ENV, EXIT_BAD_CALL, EXIT_FAILED, EXIT_PANICKED, EXIT_UNKNOWN, FunctionTable};
pub use dispatch::{Delivery, group_alive, signal_group, wait_for_shutdown_signal};
pub use dispatch::{FunctionCall, JobPayload, JobSpec};
pub use error::{BusError, DispatchError, FanoutError, ObserverError, RunError, StorageError};
pub use fanout::Fanout;
pub use observers::{CountObserver, Counts, ProgressObserver};
pub use reaper::{Entry, Reaper, ReaperLog, SweepReport, replay, survivors, sweep, sweep_log};
pub use runner::{BatchStamp, Deduplicator, Disposition, ProgressAdapter, RunReport, Runner, RunnerBuilder};
pub use storage::{Experiment, RecordId, RunRecord, Setting, Storage, Trajectory};

// Optional: expose a simple built-in logging observer (demo/reference).
#[cfg(feature = "logging")]
pub use observers::LogObserver;
