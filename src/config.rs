//! # Global runtime configuration.
//!
//! Provides [`Config`] centralized settings for the dispatcher and runner.
//!
//! Config is used in two ways:
//! 1. **Dispatcher creation**: `Dispatcher::new(config)`
//! 2. **Job defaults**: a [`JobSpec`](crate::JobSpec) without its own timeout inherits
//!    [`Config::default_timeout`].
//!
//! ## Sentinel values
//! - `concurrency = 0` → one slot per host core
//! - `timeout = 0s` → no timeout

use std::ffi::OsString;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::time::Duration;

/// Program (plus leading arguments) re-executed to run isolated function jobs.
///
/// The child receives the encoded call in the `JOBVISOR_CALL` environment variable and
/// is expected to hand it to [`FunctionTable::serve`](crate::FunctionTable::serve).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FunctionHost {
    /// Executable to start.
    pub program: PathBuf,
    /// Arguments passed before anything else.
    pub args: Vec<OsString>,
}

impl FunctionHost {
    /// Creates a host for the given program with no extra arguments.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Appends one argument.
    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// The currently running executable.
    pub fn current_exe() -> std::io::Result<Self> {
        Ok(Self::new(std::env::current_exe()?))
    }
}

/// Global configuration for the job runtime.
///
/// ## Field semantics
/// - `concurrency`: simultaneous jobs (`0` = host core count)
/// - `timeout`: default per-job timeout (`0s` = none)
/// - `grace`: wait between `SIGTERM` and `SIGKILL` when terminating a process group;
///   also bounds output draining and worker shutdown on interrupt
/// - `capture_output`: default for capturing stdout/stderr of batch jobs
/// - `shell`: interpreter used for shell jobs (`<shell> -c <command>`)
/// - `reaper_dir`: directory for the orphan reaper log (`None` = system temp dir)
/// - `handle_signals`: cancel the batch on SIGINT/SIGTERM/SIGQUIT (on by default)
/// - `function_host`: program used for function jobs (`None` = current executable)
///
/// ## Notes
/// All fields are public. Prefer the accessors to avoid sprinkling sentinel checks.
#[derive(Clone, Debug)]
pub struct Config {
    /// Maximum number of jobs executing at once (`0` = host core count).
    pub concurrency: usize,

    /// Default job timeout (`Duration::ZERO` = none).
    pub timeout: Duration,

    /// Grace period of the termination escalation (`SIGTERM` → wait → `SIGKILL`).
    pub grace: Duration,

    /// Capture stdout/stderr of batch jobs by default.
    pub capture_output: bool,

    /// Shell used for shell jobs.
    pub shell: PathBuf,

    /// Directory holding the reaper log.
    pub reaper_dir: Option<PathBuf>,

    /// Install an OS signal listener that cancels the running batch.
    ///
    /// While a batch runs, SIGINT/SIGTERM/SIGQUIT interrupt it instead of killing the
    /// process, so running groups are terminated and the orphan sweep runs. Set to `false`
    /// when the caller handles these signals itself and cancels the batch token.
    pub handle_signals: bool,

    /// Program used to run function jobs in isolation.
    pub function_host: Option<FunctionHost>,
}

impl Config {
    /// Returns the effective number of worker slots.
    ///
    /// - `concurrency > 0` → that value
    /// - `concurrency = 0` → available parallelism (1 if it cannot be determined)
    #[inline]
    pub fn worker_slots(&self) -> usize {
        match self.concurrency {
            0 => std::thread::available_parallelism()
                .map(NonZeroUsize::get)
                .unwrap_or(1),
            n => n,
        }
    }

    /// Returns the default per-job timeout as an `Option`.
    ///
    /// - `None` → no timeout
    /// - `Some(d)` → timeout applied to each job lacking its own
    #[inline]
    pub fn default_timeout(&self) -> Option<Duration> {
        if self.timeout == Duration::ZERO {
            None
        } else {
            Some(self.timeout)
        }
    }

    /// Returns the function host, falling back to the current executable.
    pub fn function_host(&self) -> std::io::Result<FunctionHost> {
        match &self.function_host {
            Some(host) => Ok(host.clone()),
            None => FunctionHost::current_exe(),
        }
    }
}

impl Default for Config {
    /// Default configuration:
    ///
    /// - `concurrency = 0` (host core count)
    /// - `timeout = 0s` (no timeout)
    /// - `grace = 2s`
    /// - `capture_output = false`
    /// - `shell = /bin/sh`
    /// - `reaper_dir = None` (system temp dir)
    /// - `handle_signals = true`
    /// - `function_host = None` (current executable)
    fn default() -> Self {
        Self {
            concurrency: 0,
            timeout: Duration::ZERO,
            grace: Duration::from_secs(2),
            capture_output: false,
            shell: PathBuf::from("/bin/sh"),
            reaper_dir: None,
            handle_signals: true,
            function_host: None,
        }
    }
}
