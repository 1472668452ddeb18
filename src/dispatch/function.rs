//! # Isolated function jobs.
//!
//! A function job runs in a separate OS process: the dispatcher re-executes a host
//! program ([`FunctionHost`], by default the current executable) with the encoded
//! [`FunctionCall`] in the [`CALL_ENV`] environment variable. The host program looks the
//! function up in its [`FunctionTable`] and exits with the outcome as its status code.
//!
//! ## Flow
//! ```text
//! parent (dispatcher worker)                child (host program)
//!   Command(host.program, host.args)
//!     env JOBVISOR_CALL = {"name":..} ──►   main():
//!     process_group(0)                        if let Some(code) = table.serve() {
//!                                                 std::process::exit(code)
//!   wait / timeout / terminate group         }
//! ```
//!
//! ## Exit codes
//! - `0` the function returned `Ok`
//! - `1` the function returned `Err`
//! - `2` the call could not be decoded
//! - `101` the function panicked
//! - `127` no function with that name is registered
//!
//! ## Example
//! ```rust,no_run
//! use jobvisor::FunctionTable;
//!
//! fn main() {
//!     let table = FunctionTable::new().register("square", |args, _kwargs| -> Result<(), String> {
//!         let n = args.first().and_then(|v| v.as_i64()).ok_or("missing n")?;
//!         println!("{}", n * n);
//!         Ok(())
//!     });
//!     if let Some(code) = table.serve() {
//!         std::process::exit(code);
//!     }
//!     // ... regular program: build and submit a batch ...
//! }
//! ```

use std::collections::HashMap;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use serde_json::{Map, Value};
use tokio::process::Command;

use super::spec::FunctionCall;
use crate::config::FunctionHost;

/// Environment variable carrying the JSON-encoded call to the child process.
pub const CALL_ENV: &str = "JOBVISOR_CALL";

/// Exit code: the function returned `Err`.
pub const EXIT_FAILED: i32 = 1;
/// Exit code: the call in [`CALL_ENV`] is not valid JSON.
pub const EXIT_BAD_CALL: i32 = 2;
/// Exit code: the function panicked.
pub const EXIT_PANICKED: i32 = 101;
/// Exit code: the function name is not registered.
pub const EXIT_UNKNOWN: i32 = 127;

type Callable = dyn Fn(&[Value], &Map<String, Value>) -> Result<(), String> + Send + Sync;

/// Registry of functions a host program can run on behalf of the dispatcher.
#[derive(Clone, Default)]
pub struct FunctionTable {
    entries: HashMap<String, Arc<Callable>>,
}

impl FunctionTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `f` under `name`, replacing any previous entry.
    #[must_use]
    pub fn register<F, E>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&[Value], &Map<String, Value>) -> Result<(), E> + Send + Sync + 'static,
        E: fmt::Display,
    {
        let f = move |args: &[Value], kwargs: &Map<String, Value>| {
            f(args, kwargs).map_err(|e| e.to_string())
        };
        self.entries.insert(name.into(), Arc::new(f));
        self
    }

    /// True if `name` is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Runs `call` in the current process and returns the exit code for it.
    pub fn invoke(&self, call: &FunctionCall) -> i32 {
        let Some(f) = self.entries.get(&call.name) else {
            tracing::error!(function = %call.name, "function not registered");
            return EXIT_UNKNOWN;
        };
        match catch_unwind(AssertUnwindSafe(|| f(&call.args, &call.kwargs))) {
            Ok(Ok(())) => 0,
            Ok(Err(err)) => {
                tracing::error!(function = %call.name, error = %err, "function failed");
                eprintln!("{}: {err}", call.name);
                EXIT_FAILED
            }
            Err(_) => EXIT_PANICKED,
        }
    }

    /// Child-side entry point.
    ///
    /// Returns `None` when this process was not started as a function job; otherwise
    /// runs the requested call and returns the exit code the process should exit with.
    pub fn serve(&self) -> Option<i32> {
        let raw = std::env::var(CALL_ENV).ok()?;
        let code = match serde_json::from_str::<FunctionCall>(&raw) {
            Ok(call) => self.invoke(&call),
            Err(err) => {
                tracing::error!(error = %err, "undecodable function call");
                eprintln!("{CALL_ENV}: {err}");
                EXIT_BAD_CALL
            }
        };
        Some(code)
    }
}

impl fmt::Debug for FunctionTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&str> = self.entries.keys().map(String::as_str).collect();
        names.sort_unstable();
        f.debug_struct("FunctionTable")
            .field("functions", &names)
            .finish()
    }
}

/// Builds the command that runs `call` through `host`.
pub(crate) fn host_command(host: &FunctionHost, call: &FunctionCall) -> serde_json::Result<Command> {
    let encoded = serde_json::to_string(call)?;
    let mut cmd = Command::new(&host.program);
    cmd.args(&host.args).env(CALL_ENV, encoded);
    Ok(cmd)
}
