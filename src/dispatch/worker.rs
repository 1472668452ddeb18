//! # Per-job worker.
//!
//! [`run_job`] owns one job from spawn to settlement: it starts the job's process in a
//! new process group, waits for it under the job timeout and the batch token, terminates
//! the group when needed and reports the outcome.
//!
//! ## Flow
//! ```text
//! build command ── spawn error ──────────────────────────────► Failed
//!      │
//!      ▼
//!   spawn (process_group(0), kill_on_drop)
//!      ├─► tracker: Started(pgid)        ► sink: Started
//!      ▼
//!   select {
//!     child exits        ─► Done (status 0) | Failed (status != 0)
//!     timeout elapses    ─► terminate_group ─► Timeout
//!     batch cancelled    ─► terminate_group ─► Timeout
//!   }
//!      ├─► tracker: terminal(pgid)
//!      ├─► drain captured output (bounded by grace)
//!      └─► sink: terminal           (exactly once, last)
//! ```

use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio::time::{Instant, timeout};
use tokio_util::sync::CancellationToken;

use super::function::host_command;
use super::spec::{JobPayload, JobSpec};
use super::terminate::terminate_group;
use crate::bus::{Meta, Status, Update, UpdateSink};
use crate::config::Config;

/// Outcome of one job.
#[derive(Debug, Clone, PartialEq)]
pub struct JobResult {
    /// Batch index of the job.
    pub index: usize,
    /// Description of what was run.
    pub command: Arc<str>,
    /// Terminal status.
    pub status: Status,
    /// Exit code, when the process exited normally.
    pub exit_code: Option<i32>,
    /// Captured standard output (lossy UTF-8), when capture was enabled.
    pub stdout: Option<String>,
    /// Captured standard error (lossy UTF-8), when capture was enabled.
    pub stderr: Option<String>,
    /// Wall time from spawn to settlement.
    pub elapsed: Duration,
}

impl JobResult {
    pub(crate) fn without_process(index: usize, command: Arc<str>, status: Status) -> Self {
        Self {
            index,
            command,
            status,
            exit_code: None,
            stdout: None,
            stderr: None,
            elapsed: Duration::ZERO,
        }
    }
}

/// Everything a worker needs besides its job.
#[derive(Clone)]
pub(crate) struct WorkerCtx {
    pub cfg: Arc<Config>,
    pub sink: Option<UpdateSink>,
    pub tracker: Option<UpdateSink<u32>>,
}

impl WorkerCtx {
    pub fn detached(cfg: Arc<Config>) -> Self {
        Self {
            cfg,
            sink: None,
            tracker: None,
        }
    }

    fn publish(&self, status: Status, index: usize, command: &Arc<str>, meta: &Meta) {
        if let Some(sink) = &self.sink {
            sink.publish(Update {
                status,
                index,
                command: command.clone(),
                meta: meta.clone(),
            });
        }
    }

    fn track(&self, status: Status, index: usize, command: &Arc<str>, pgid: u32) {
        if let Some(tracker) = &self.tracker {
            tracker.publish(Update {
                status,
                index,
                command: command.clone(),
                meta: pgid,
            });
        }
    }
}

enum Wait {
    Exited(std::io::Result<std::process::ExitStatus>),
    TimedOut,
    Interrupted,
}

/// Runs one job to settlement. Publishes at most one `Started` and exactly one terminal.
pub(crate) async fn run_job(ctx: WorkerCtx, job: JobSpec, token: CancellationToken) -> JobResult {
    let index = job.index();
    let command = job.payload().describe();
    let capture = job.capture().unwrap_or(ctx.cfg.capture_output);
    let limit = job
        .timeout()
        .or_else(|| ctx.cfg.default_timeout())
        .filter(|d| !d.is_zero());

    let spawned = build_command(&ctx.cfg, job.payload()).and_then(|mut cmd| {
        cmd.process_group(0)
            .kill_on_drop(true)
            .stdin(Stdio::null());
        if capture {
            cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
        }
        cmd.spawn()
    });
    let mut child = match spawned {
        Ok(child) => child,
        Err(err) => {
            tracing::warn!(index, command = %command, error = %err, "job failed to start");
            ctx.publish(Status::Failed, index, &command, job.meta());
            return JobResult::without_process(index, command, Status::Failed);
        }
    };
    let started_at = Instant::now();
    let pgid = child.id().unwrap_or_default();

    ctx.track(Status::Started, index, &command, pgid);
    ctx.publish(Status::Started, index, &command, job.meta());
    tracing::debug!(index, pid = pgid, command = %command, "job started");

    let stdout = child.stdout.take().map(|out| tokio::spawn(read_all(out)));
    let stderr = child.stderr.take().map(|err| tokio::spawn(read_all(err)));

    let wait = tokio::select! {
        res = child.wait() => Wait::Exited(res),
        _ = sleep_for(limit) => Wait::TimedOut,
        _ = token.cancelled() => Wait::Interrupted,
    };

    let (status, exit_code) = match wait {
        Wait::Exited(Ok(exit)) if exit.success() => (Status::Done, exit.code()),
        Wait::Exited(Ok(exit)) => (Status::Failed, exit.code()),
        Wait::Exited(Err(err)) => {
            tracing::warn!(index, pid = pgid, error = %err, "waiting on job failed");
            stop(&mut child, pgid, ctx.cfg.grace).await;
            (Status::Failed, None)
        }
        Wait::TimedOut => {
            tracing::info!(index, pid = pgid, timeout = ?limit, "job timed out; terminating");
            stop(&mut child, pgid, ctx.cfg.grace).await;
            (Status::Timeout, None)
        }
        Wait::Interrupted => {
            tracing::info!(index, pid = pgid, "batch interrupted; terminating job");
            stop(&mut child, pgid, ctx.cfg.grace).await;
            (Status::Timeout, None)
        }
    };
    ctx.track(status, index, &command, pgid);

    let stdout = collect(stdout, ctx.cfg.grace).await;
    let stderr = collect(stderr, ctx.cfg.grace).await;
    let elapsed = started_at.elapsed();
    tracing::debug!(index, pid = pgid, status = %status, ?exit_code, ?elapsed, "job settled");

    ctx.publish(status, index, &command, job.meta());
    JobResult {
        index,
        command,
        status,
        exit_code,
        stdout,
        stderr,
        elapsed,
    }
}

fn build_command(cfg: &Config, payload: &JobPayload) -> std::io::Result<Command> {
    match payload {
        JobPayload::Shell(line) => {
            let mut cmd = Command::new(&cfg.shell);
            cmd.arg("-c").arg(line);
            Ok(cmd)
        }
        JobPayload::Function(call) => {
            let host = cfg.function_host()?;
            host_command(&host, call).map_err(std::io::Error::other)
        }
    }
}

async fn stop(child: &mut Child, pgid: u32, grace: Duration) {
    if pgid == 0 {
        let _ = child.kill().await;
        return;
    }
    terminate_group(pgid, Some(child), grace).await;
}

async fn sleep_for(limit: Option<Duration>) {
    match limit {
        Some(d) => tokio::time::sleep(d).await,
        None => std::future::pending().await,
    }
}

async fn read_all<R: tokio::io::AsyncRead + Unpin>(mut reader: R) -> std::io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    reader.read_to_end(&mut buf).await?;
    Ok(buf)
}

/// Waits for an output reader; a reader still blocked after `grace` (a descendant that
/// escaped the group keeps the pipe open) is abandoned.
async fn collect(
    reader: Option<JoinHandle<std::io::Result<Vec<u8>>>>,
    grace: Duration,
) -> Option<String> {
    let mut handle = reader?;
    match timeout(grace, &mut handle).await {
        Ok(Ok(Ok(bytes))) => Some(String::from_utf8_lossy(&bytes).into_owned()),
        Ok(Ok(Err(err))) => {
            tracing::debug!(error = %err, "reading job output failed");
            Some(String::new())
        }
        Ok(Err(_)) => Some(String::new()),
        Err(_) => {
            handle.abort();
            tracing::debug!("job output still open after grace; abandoned");
            Some(String::new())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{Message, channel};

    fn ctx(cfg: Config) -> (WorkerCtx, crate::bus::UpdateStream, crate::bus::UpdateStream<u32>) {
        let (sink, stream) = channel();
        let (tracker, tracked) = channel();
        let ctx = WorkerCtx {
            cfg: Arc::new(cfg),
            sink: Some(sink),
            tracker: Some(tracker),
        };
        (ctx, stream, tracked)
    }

    async fn statuses<M>(mut stream: crate::bus::UpdateStream<M>) -> Vec<Status> {
        let mut out = Vec::new();
        while let Some(Message::Update(up)) = stream.recv().await {
            out.push(up.status);
        }
        out
    }

    #[tokio::test]
    async fn successful_job_reports_started_then_done() {
        let (ctx, stream, tracked) = ctx(Config::default());
        let job = JobSpec::shell("echo hi").with_capture(true);
        let res = run_job(ctx, job, CancellationToken::new()).await;

        assert_eq!(res.status, Status::Done);
        assert_eq!(res.exit_code, Some(0));
        assert_eq!(res.stdout.as_deref(), Some("hi\n"));
        assert_eq!(statuses(stream).await, vec![Status::Started, Status::Done]);
        assert_eq!(statuses(tracked).await, vec![Status::Started, Status::Done]);
    }

    #[tokio::test]
    async fn nonzero_exit_is_failure() {
        let (ctx, stream, _tracked) = ctx(Config::default());
        let res = run_job(ctx, JobSpec::shell("exit 3"), CancellationToken::new()).await;
        assert_eq!(res.status, Status::Failed);
        assert_eq!(res.exit_code, Some(3));
        assert_eq!(statuses(stream).await, vec![Status::Started, Status::Failed]);
    }

    #[tokio::test]
    async fn spawn_error_fails_without_start() {
        let cfg = Config {
            shell: "/nonexistent/shell".into(),
            ..Config::default()
        };
        let (ctx, stream, _tracked) = ctx(cfg);
        let res = run_job(ctx, JobSpec::shell("true"), CancellationToken::new()).await;
        assert_eq!(res.status, Status::Failed);
        assert_eq!(statuses(stream).await, vec![Status::Failed]);
    }

    #[tokio::test]
    async fn timeout_terminates_the_job() {
        let cfg = Config {
            grace: Duration::from_millis(200),
            ..Config::default()
        };
        let (ctx, stream, _tracked) = ctx(cfg);
        let job = JobSpec::shell("sleep 5").with_timeout(Some(Duration::from_millis(100)));
        let begin = Instant::now();
        let res = run_job(ctx, job, CancellationToken::new()).await;
        assert_eq!(res.status, Status::Timeout);
        assert!(begin.elapsed() < Duration::from_secs(3));
        assert_eq!(statuses(stream).await, vec![Status::Started, Status::Timeout]);
    }

    #[tokio::test]
    async fn cancellation_reports_timeout() {
        let (ctx, _stream, _tracked) = ctx(Config::default());
        let token = CancellationToken::new();
        let job = JobSpec::shell("sleep 5");
        let handle = tokio::spawn(run_job(ctx, job, token.clone()));
        tokio::time::sleep(Duration::from_millis(100)).await;
        token.cancel();
        let res = handle.await.unwrap();
        assert_eq!(res.status, Status::Timeout);
    }
}
