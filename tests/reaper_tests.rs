
use std::io::Write;
use std::os::unix::process::{CommandExt, ExitStatusExt};
use std::process::{Child, Command};
use std::time::Duration;

use jobvisor::{Reaper, Status, Update, group_alive, sweep_log};
use test_harness::{assert_eventually, init_tracing};

fn spawn_group_leader() -> Child {
    Command::new("sleep")
        .arg("30")
        .process_group(0)
        .spawn()
        .expect("spawn sleep")
}

fn tracked(status: Status, pgid: u32) -> Update<u32> {
    Update {
        status,
        index: 0,
        command: "sleep 30".into(),
        meta: pgid,
    }
}

#[test]
fn test_sweep_terminates_unremoved_groups_only() {
    init_tracing();
    let mut orphan = spawn_group_leader();
    let mut settled = spawn_group_leader();

    let mut log = tempfile::NamedTempFile::new().unwrap();
    writeln!(log, "ADD {}", orphan.id()).unwrap();
    writeln!(log, "ADD {}", settled.id()).unwrap();
    writeln!(log, "REM {}", settled.id()).unwrap();
    writeln!(log, "not a log line").unwrap();
    log.flush().unwrap();

    let report = sweep_log(log.path(), Duration::from_millis(500)).unwrap();
    assert_eq!(report.survivors, vec![orphan.id()]);
    assert_eq!(report.signalled, 1);

    let status = orphan.wait().unwrap();
    assert_eq!(status.signal(), Some(sigterm()));
    assert!(settled.try_wait().unwrap().is_none());

    settled.kill().unwrap();
    settled.wait().unwrap();
}

fn sigterm() -> i32 {
    nix::sys::signal::Signal::SIGTERM as i32
}

#[tokio::test]
async fn test_finish_without_interrupt_deletes_log() {
    let dir = tempfile::tempdir().unwrap();
    let reaper = Reaper::start(Some(dir.path()), Duration::from_millis(200)).unwrap();
    let path = reaper.path().unwrap().to_path_buf();
    assert!(path.exists());

    reaper.sink().publish(tracked(Status::Started, 4_000_000));
    reaper.sink().publish(tracked(Status::Done, 4_000_000));
    assert!(reaper.finish(false).await.is_none());
    assert!(!path.exists());
}

#[tokio::test]
async fn test_interrupted_finish_sweeps_survivors() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let mut child = spawn_group_leader();
    let pgid = child.id();

    let reaper = Reaper::start(Some(dir.path()), Duration::from_millis(300)).unwrap();
    reaper.sink().publish(tracked(Status::Started, pgid));
    let report = reaper.finish(true).await.expect("sweep report");

    assert_eq!(report.survivors, vec![pgid]);
    let status = tokio::task::spawn_blocking(move || child.wait().unwrap())
        .await
        .unwrap();
    assert!(status.signal().is_some());
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_dropped_reaper_sweeps_from_drop() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let mut child = spawn_group_leader();
    let pgid = child.id();

    let reaper = Reaper::start(Some(dir.path()), Duration::from_millis(300)).unwrap();
    let path = reaper.path().unwrap().to_path_buf();
    reaper.sink().publish(tracked(Status::Started, pgid));

    let log_path = path.clone();
    assert_eventually(
        move || {
            let log_path = log_path.clone();
            async move {
                std::fs::read_to_string(&log_path)
                    .map(|text| text.contains("ADD"))
                    .unwrap_or(false)
            }
        },
        Duration::from_secs(5),
        "tracker never wrote the ADD entry",
    )
    .await;

    drop(reaper);
    let status = tokio::task::spawn_blocking(move || child.wait().unwrap())
        .await
        .unwrap();
    assert!(status.signal().is_some());
    assert!(!group_alive(pgid));
    assert!(!path.exists());
}

#[tokio::test]
async fn test_drop_sweeps_groups_still_queued_for_the_tracker() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let mut child = spawn_group_leader();
    let pgid = child.id();

    // Current-thread runtime: the tracker cannot run before the drop below.
    let reaper = Reaper::start(Some(dir.path()), Duration::from_millis(300)).unwrap();
    let path = reaper.path().unwrap().to_path_buf();
    reaper.sink().publish(tracked(Status::Started, pgid));
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "");

    drop(reaper);
    let status = tokio::task::spawn_blocking(move || child.wait().unwrap())
        .await
        .unwrap();
    assert!(status.signal().is_some());
    assert!(!group_alive(pgid));
    assert!(!path.exists());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_drop_on_a_worker_thread_sweeps() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let mut child = spawn_group_leader();
    let pgid = child.id();

    let reaper = Reaper::start(Some(dir.path()), Duration::from_millis(300)).unwrap();
    reaper.sink().publish(tracked(Status::Started, pgid));
    tokio::spawn(async move { drop(reaper) }).await.unwrap();

    let status = tokio::task::spawn_blocking(move || child.wait().unwrap())
        .await
        .unwrap();
    assert!(status.signal().is_some());
}
