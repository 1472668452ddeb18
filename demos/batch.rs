//! # Example: batch
//!
//! A resumable run of a small trajectory with the built-in [`LogObserver`], an
//! in-memory storage and Ctrl-C handling.
//!
//! Demonstrates how to:
//! - Implement [`Experiment`] and [`Storage`] for a job type.
//! - Build a [`Runner`] with storage, observers and signal handling.
//! - Resume: the second run skips every setting the first one stored.
//!
//! ## Flow
//! ```text
//! run #1: 4 settings ─► 4 jobs (one times out) ─► saved
//! run #2: same settings ─► Deduplicator finds records ─► 0 jobs
//! ```
//!
//! ## Run
//! ```bash
//! RUST_LOG=info cargo run --example batch --features logging
//! ```

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use jobvisor::{
    BatchStamp, Config, CountObserver, Experiment, JobPayload, LogObserver, ProgressObserver,
    RecordId, RunError, RunRecord, Runner, Setting, Storage, StorageError, Trajectory,
};
use tokio_util::sync::CancellationToken;

#[derive(Clone, Debug)]
struct Nap {
    setting: Setting,
    secs: f64,
    id: Option<RecordId>,
    run_id: Option<u64>,
}

impl Nap {
    fn new(secs: f64) -> (Setting, Self) {
        let setting = Setting::new().with("secs", secs);
        let nap = Self {
            setting: setting.clone(),
            secs,
            id: None,
            run_id: None,
        };
        (setting, nap)
    }
}

impl Experiment for Nap {
    fn kind(&self) -> &str {
        "nap"
    }

    fn identifier(&self) -> Option<RecordId> {
        self.id
    }

    fn set_identifier(&mut self, id: RecordId) {
        self.id = Some(id);
    }

    fn stamp(&mut self, stamp: &BatchStamp) {
        self.run_id = stamp.run_id;
    }

    fn payload(&self) -> JobPayload {
        JobPayload::Shell(format!("sleep {}", self.secs))
    }
}

#[derive(Default)]
struct Memory {
    runs: Mutex<u64>,
    records: Mutex<Vec<(RunRecord, Nap)>>,
}

#[async_trait]
impl Storage<Nap> for Memory {
    async fn new_run(&self) -> Result<u64, StorageError> {
        let mut runs = self.runs.lock().map_err(|e| StorageError::Backend(e.to_string()))?;
        *runs += 1;
        Ok(*runs)
    }

    async fn experiments(&self, _kind: &str, _group: Option<&str>) -> Result<Vec<RunRecord>, StorageError> {
        let records = self.records.lock().map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(records.iter().map(|(r, _)| r.clone()).collect())
    }

    async fn save(&self, nap: &mut Nap) -> Result<(), StorageError> {
        let mut records = self.records.lock().map_err(|e| StorageError::Backend(e.to_string()))?;
        let id = records.len() as RecordId + 1;
        nap.id = Some(id);
        let fields = nap.setting.iter().map(|(k, v)| (k.to_string(), v.clone())).collect();
        records.push((RunRecord::new(id, fields), nap.clone()));
        Ok(())
    }

    async fn reload(&self, nap: &Nap) -> Result<Nap, StorageError> {
        let records = self.records.lock().map_err(|e| StorageError::Backend(e.to_string()))?;
        records
            .iter()
            .find(|(r, _)| Some(r.id) == nap.id)
            .map(|(_, n)| n.clone())
            .ok_or(StorageError::NotFound { id: nap.id.unwrap_or_default() })
    }
}

fn trajectory() -> Trajectory<Nap> {
    [0.2, 0.4, 0.6, 3.0]
        .into_iter()
        .map(Nap::new)
        .fold(Trajectory::new("naps"), |t, (setting, nap)| t.push(setting, nap))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // 1. Runtime configuration: two slots, 1s per job (Ctrl-C interrupts the batch)
    let cfg = Config {
        concurrency: 2,
        timeout: Duration::from_secs(1),
        ..Config::default()
    };

    // 2. Storage and observers
    let storage: Arc<dyn Storage<Nap>> = Arc::new(Memory::default());
    let counts = Arc::new(CountObserver::new());
    let runner = Runner::builder(cfg)
        .with_storage(storage)
        .with_observer(Arc::new(LogObserver) as Arc<dyn ProgressObserver<Nap>>)
        .with_observer(counts.clone() as Arc<dyn ProgressObserver<Nap>>)
        .build();

    // 3. Two runs over the same trajectory; the second one resumes
    let token = CancellationToken::new();
    for attempt in 1..=2 {
        match runner.run(trajectory(), &token).await {
            Ok(report) => println!(
                "[run {attempt}] run_id={:?} skipped={} settled={:?}",
                report.stamp.run_id,
                report.skipped(),
                report.dispositions
            ),
            Err(RunError::Interrupted { unstarted }) => {
                println!("[run {attempt}] interrupted; never started: {unstarted:?}");
                break;
            }
            Err(err) => return Err(err.into()),
        }
    }
    println!("[counts] {:?}", counts.snapshot());
    Ok(())
}
