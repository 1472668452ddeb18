
use std::sync::Arc;
use std::time::Duration;

use jobvisor::{
    BatchStamp, Config, CountObserver, Disposition, ProgressObserver, RunError, Runner, Setting,
    Status, Storage, Trajectory,
};
use serde_json::json;
use test_harness::{MemoryStorage, Tape, Trial, init_tracing};
use tokio_util::sync::CancellationToken;

fn config(concurrency: usize) -> Config {
    Config {
        concurrency,
        grace: Duration::from_millis(300),
        ..Config::default()
    }
}

fn stored(group: &str) -> Arc<MemoryStorage> {
    Arc::new(MemoryStorage::new().with_record("trial", group, 42, json!({"a": 1, "b": 2, "run": 1})))
}

fn runner(storage: &Arc<MemoryStorage>, tape: &Arc<Tape>, repeat: bool, concurrency: usize) -> Runner<Trial> {
    Runner::builder(config(concurrency))
        .with_storage(storage.clone() as Arc<dyn Storage<Trial>>)
        .with_observer(tape.clone() as Arc<dyn ProgressObserver<Trial>>)
        .repeat(repeat)
        .build()
}

fn same_setting() -> Setting {
    Setting::new().with("a", 1).with("b", 2)
}

#[tokio::test]
async fn test_stored_setting_is_rebound_not_run() {
    init_tracing();
    let storage = stored("resume");
    let tape = Arc::new(Tape::default());
    let trajectory = Trajectory::new("resume").push(same_setting(), Trial::new(same_setting(), "true"));

    let report = runner(&storage, &tape, false, 2)
        .run(trajectory, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.dispositions, vec![Disposition::SkippedExisting { id: 42 }]);
    let trial = &report.experiments[0];
    assert_eq!(trial.id, Some(42));
    assert!(trial.reloaded);
    assert_eq!(trial.setting.get("run"), Some(&json!(1)));
    assert_eq!(trial.group.as_deref(), Some("resume"));
    assert!(report.batch.results.is_empty());
    assert_eq!(storage.queried_groups(), vec![Some("resume".to_string())]);
    assert_eq!(
        tape.lines(),
        vec!["run_started resume run=Some(1) jobs=0", "run_finished resume"]
    );
    assert!(storage.saved().is_empty());
}

#[tokio::test]
async fn test_repeat_runs_again_under_a_new_identifier() {
    init_tracing();
    let storage = stored("again");
    let tape = Arc::new(Tape::default());
    let trajectory = Trajectory::new("again").push(same_setting(), Trial::new(same_setting(), "true"));

    let report = runner(&storage, &tape, true, 2)
        .run(trajectory, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.dispositions, vec![Disposition::Settled(Status::Done)]);
    let trial = &report.experiments[0];
    assert_eq!(trial.id, Some(100));
    assert_eq!(trial.run_id, Some(1));
    assert!(trial.host.is_some());
    assert!(trial.reloaded);
    assert_eq!(
        tape.lines(),
        vec![
            "run_started again run=Some(1) jobs=1",
            "started 0 true",
            "finished 0 true reloaded=true",
            "run_finished again",
        ]
    );
    assert_eq!(storage.queries(), 0);
}

#[tokio::test]
async fn test_callbacks_follow_batch_indices_of_submitted_jobs() {
    init_tracing();
    let storage = stored("mixed");
    let tape = Arc::new(Tape::default());
    let trajectory = Trajectory::new("mixed")
        .push(same_setting(), Trial::new(same_setting(), "true"))
        .push(Setting::new().with("a", 2), Trial::new(Setting::new().with("a", 2), "exit 3"))
        .push(Setting::new().with("a", 3), Trial::new(Setting::new().with("a", 3), "echo ok"));

    let report = runner(&storage, &tape, false, 1)
        .run(trajectory, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(
        report.dispositions,
        vec![
            Disposition::SkippedExisting { id: 42 },
            Disposition::Settled(Status::Failed),
            Disposition::Settled(Status::Done),
        ]
    );
    assert_eq!(report.skipped(), 1);
    assert_eq!(
        tape.lines(),
        vec![
            "run_started mixed run=Some(1) jobs=2",
            "started 0 exit 3",
            "failed 0 exit 3 reloaded=true",
            "started 1 echo ok",
            "finished 1 echo ok reloaded=true",
            "run_finished mixed",
        ]
    );
    assert_eq!(storage.queries(), 1);
    let ids: Vec<_> = storage.saved().iter().map(|t| t.id).collect();
    assert_eq!(ids, vec![Some(100), Some(101)]);
}

#[tokio::test]
async fn test_observers_without_reload_get_submitted_copies() {
    let counts = Arc::new(CountObserver::new());
    let runner = Runner::builder(config(2))
        .with_observer(counts.clone() as Arc<dyn ProgressObserver<Trial>>)
        .build();
    let trajectory = Trajectory::new("bare")
        .push(Setting::new(), Trial::new(Setting::new(), "true"))
        .push(Setting::new(), Trial::new(Setting::new(), "false"));

    let report = runner.run(trajectory, &CancellationToken::new()).await.unwrap();

    assert_eq!(report.stamp.run_id, None);
    assert!(report.experiments.iter().all(|t| t.id.is_none() && !t.reloaded));
    let counts = counts.snapshot();
    assert_eq!((counts.started, counts.finished, counts.failed), (2, 1, 1));
}

#[tokio::test]
async fn test_interrupted_run_reports_unstarted_positions() {
    init_tracing();
    let storage = stored("cut");
    let tape = Arc::new(Tape::default());
    let trajectory = Trajectory::new("cut")
        .push(same_setting(), Trial::new(same_setting(), "true"))
        .push(Setting::new().with("a", 5), Trial::new(Setting::new().with("a", 5), "sleep 10"))
        .push(Setting::new().with("a", 6), Trial::new(Setting::new().with("a", 6), "sleep 10"));
    let token = CancellationToken::new();
    let cancel = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(300)).await;
        cancel.cancel();
    });

    let err = runner(&storage, &tape, false, 1)
        .run(trajectory, &token)
        .await
        .unwrap_err();

    match err {
        RunError::Interrupted { unstarted } => assert_eq!(unstarted, vec![2]),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(
        tape.lines(),
        vec![
            "run_started cut run=Some(1) jobs=2",
            "started 0 sleep 10",
            "interrupted 0 sleep 10",
            "run_finished cut",
        ]
    );
}

#[tokio::test]
async fn test_dedup_is_scoped_to_the_trajectory_group() {
    init_tracing();
    let storage = stored("sweep-A");
    let tape = Arc::new(Tape::default());
    let trajectory = Trajectory::new("sweep-B").push(same_setting(), Trial::new(same_setting(), "true"));

    let report = runner(&storage, &tape, false, 1)
        .run(trajectory, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.dispositions, vec![Disposition::Settled(Status::Done)]);
    assert_eq!(storage.queried_groups(), vec![Some("sweep-B".to_string())]);
    assert_eq!(report.stamp.group.as_deref(), Some("sweep-B"));
    assert_eq!(storage.saved()[0].group.as_deref(), Some("sweep-B"));
}

#[tokio::test]
async fn test_explicit_group_overrides_the_trajectory_name() {
    init_tracing();
    let storage = stored("sweep-A");
    let runner: Runner<Trial> = Runner::builder(config(1))
        .with_storage(storage.clone() as Arc<dyn Storage<Trial>>)
        .group("sweep-A")
        .build();
    let trajectory = Trajectory::new("sweep-B").push(same_setting(), Trial::new(same_setting(), "true"));

    let report = runner.run(trajectory, &CancellationToken::new()).await.unwrap();

    assert_eq!(report.dispositions, vec![Disposition::SkippedExisting { id: 42 }]);
    assert_eq!(storage.queried_groups(), vec![Some("sweep-A".to_string())]);
}

/// Panics in every callback it implements.
struct Unruly;

impl ProgressObserver<Trial> for Unruly {
    fn run_started(&self, _name: &str, _stamp: &BatchStamp, _count: usize) {
        panic!("run_started");
    }

    fn job_started(&self, _index: usize, _trial: &Trial) {
        panic!("job_started");
    }

    fn run_finished(&self, _name: &str, _stamp: &BatchStamp) {
        panic!("run_finished");
    }
}

#[tokio::test]
async fn test_panicking_observer_does_not_starve_later_observers() {
    init_tracing();
    let tape = Arc::new(Tape::default());
    let runner: Runner<Trial> = Runner::builder(config(1))
        .with_observer(Arc::new(Unruly) as Arc<dyn ProgressObserver<Trial>>)
        .with_observer(tape.clone() as Arc<dyn ProgressObserver<Trial>>)
        .build();
    let trajectory = Trajectory::new("loud").push(Setting::new(), Trial::new(Setting::new(), "true"));

    let report = runner.run(trajectory, &CancellationToken::new()).await.unwrap();

    assert_eq!(report.dispositions, vec![Disposition::Settled(Status::Done)]);
    assert_eq!(
        tape.lines(),
        vec![
            "run_started loud run=None jobs=1",
            "started 0 true",
            "finished 0 true reloaded=false",
            "run_finished loud",
        ]
    );
}
