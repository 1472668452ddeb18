//! Raises real signals at this test process; kept in its own binary so no other batch
//! shares the listener.


use std::time::Duration;

use jobvisor::{Config, Dispatcher, JobSpec, Status, group_alive};
use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;
use test_harness::{assert_eventually, init_tracing};
use tokio_util::sync::CancellationToken;

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_sigint_interrupts_the_batch_and_sweeps() {
    init_tracing();
    let cfg = Config {
        concurrency: 1,
        grace: Duration::from_millis(300),
        ..Config::default()
    };
    assert!(cfg.handle_signals);
    let jobs = vec![
        JobSpec::shell("echo $$; sleep 30 & sleep 30 & wait").with_capture(true),
        JobSpec::shell("true"),
    ];
    tokio::spawn(async {
        tokio::time::sleep(Duration::from_millis(400)).await;
        kill(Pid::this(), Signal::SIGINT).unwrap();
    });

    let report = Dispatcher::new(cfg)
        .submit(jobs, None, &CancellationToken::new())
        .await
        .unwrap();

    assert!(report.interrupted);
    assert_eq!(report.status(0), Some(Status::Timeout));
    assert_eq!(report.unstarted, vec![1]);
    assert!(report.swept.is_some());

    let pgid: u32 = report.results[0]
        .stdout
        .as_deref()
        .and_then(|out| out.lines().next())
        .and_then(|line| line.trim().parse().ok())
        .expect("job printed its pid");
    assert_eventually(
        || async move { !group_alive(pgid) },
        Duration::from_secs(5),
        "process group still alive after SIGINT",
    )
    .await;
}
