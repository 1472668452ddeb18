//! # Job specification.
//!
//! Defines [`JobSpec`] the unit handed to the [`Dispatcher`](crate::Dispatcher): what to
//! run ([`JobPayload`]), for how long, and which opaque metadata to attach to its updates.
//!
//! A spec can be created:
//! - **Shell** with [`JobSpec::shell`] (`<shell> -c <command>`)
//! - **Function** with [`JobSpec::function`] (registered function in an isolated process)
//!
//! ## Rules
//! - The batch index is assigned by the dispatcher in submission order (`0..N`).
//! - `timeout = None` inherits [`Config::default_timeout`](crate::Config::default_timeout).
//! - `capture = None` inherits [`Config::capture_output`](crate::Config::capture_output).

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::bus::Meta;

/// Invocation of a function registered in a [`FunctionTable`](crate::FunctionTable).
///
/// ## Example
/// ```rust
/// use jobvisor::FunctionCall;
///
/// let call = FunctionCall::new("fit").arg(3).arg("adam").kwarg("lr", 0.5);
/// assert_eq!(call.to_string(), r#"fit(3, "adam", lr=0.5)"#);
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    /// Registered function name.
    pub name: String,
    /// Positional arguments.
    #[serde(default)]
    pub args: Vec<Value>,
    /// Keyword arguments.
    #[serde(default)]
    pub kwargs: Map<String, Value>,
}

impl FunctionCall {
    /// Creates a call without arguments.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: Vec::new(),
            kwargs: Map::new(),
        }
    }

    /// Appends a positional argument.
    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.args.push(value.into());
        self
    }

    /// Sets a keyword argument.
    pub fn kwarg(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.kwargs.insert(key.into(), value.into());
        self
    }
}

impl fmt::Display for FunctionCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.name)?;
        let mut first = true;
        for arg in &self.args {
            if !first {
                f.write_str(", ")?;
            }
            write!(f, "{arg}")?;
            first = false;
        }
        for (key, value) in &self.kwargs {
            if !first {
                f.write_str(", ")?;
            }
            write!(f, "{key}={value}")?;
            first = false;
        }
        f.write_str(")")
    }
}

/// What a job runs.
#[derive(Clone, Debug, PartialEq)]
pub enum JobPayload {
    /// Shell command line.
    Shell(String),
    /// Registered function executed in an isolated process.
    Function(FunctionCall),
}

impl JobPayload {
    /// Human-readable description used as the update's `command`.
    pub fn describe(&self) -> Arc<str> {
        match self {
            JobPayload::Shell(cmd) => Arc::from(cmd.as_str()),
            JobPayload::Function(call) => Arc::from(call.to_string()),
        }
    }
}

impl From<&str> for JobPayload {
    fn from(cmd: &str) -> Self {
        JobPayload::Shell(cmd.to_string())
    }
}

impl From<String> for JobPayload {
    fn from(cmd: String) -> Self {
        JobPayload::Shell(cmd)
    }
}

impl From<FunctionCall> for JobPayload {
    fn from(call: FunctionCall) -> Self {
        JobPayload::Function(call)
    }
}

/// Specification of one job in a batch.
///
/// ## Example
/// ```rust
/// use std::time::Duration;
/// use jobvisor::JobSpec;
///
/// let spec = JobSpec::shell("sleep 1")
///     .with_timeout(Some(Duration::from_millis(100)))
///     .with_meta(serde_json::json!({"id": 12}));
/// assert_eq!(spec.timeout(), Some(Duration::from_millis(100)));
/// assert_eq!(spec.meta()["id"], 12);
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct JobSpec {
    index: usize,
    payload: JobPayload,
    timeout: Option<Duration>,
    meta: Meta,
    capture: Option<bool>,
}

impl JobSpec {
    /// Creates a spec with no timeout, null metadata and inherited capture setting.
    pub fn new(payload: impl Into<JobPayload>) -> Self {
        Self {
            index: 0,
            payload: payload.into(),
            timeout: None,
            meta: Meta::Null,
            capture: None,
        }
    }

    /// Shell job.
    pub fn shell(command: impl Into<String>) -> Self {
        Self::new(JobPayload::Shell(command.into()))
    }

    /// Function job.
    pub fn function(call: FunctionCall) -> Self {
        Self::new(JobPayload::Function(call))
    }

    /// Batch index (meaningful once submitted).
    pub fn index(&self) -> usize {
        self.index
    }

    /// Returns what the job runs.
    pub fn payload(&self) -> &JobPayload {
        &self.payload
    }

    /// Returns the job's own timeout, if any.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Returns the metadata attached to every update of this job.
    pub fn meta(&self) -> &Meta {
        &self.meta
    }

    /// Returns the capture override, if any.
    pub fn capture(&self) -> Option<bool> {
        self.capture
    }

    /// Returns a new spec with updated timeout.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Returns a new spec with updated metadata.
    pub fn with_meta(mut self, meta: Meta) -> Self {
        self.meta = meta;
        self
    }

    /// Returns a new spec that captures (or discards) stdout/stderr.
    pub fn with_capture(mut self, capture: bool) -> Self {
        self.capture = Some(capture);
        self
    }

    pub(crate) fn with_index(mut self, index: usize) -> Self {
        self.index = index;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn function_calls_describe_themselves() {
        let call = FunctionCall::new("noop");
        assert_eq!(JobPayload::from(call).describe().as_ref(), "noop()");

        let call = FunctionCall::new("sum").arg(1).arg(2);
        assert_eq!(call.to_string(), "sum(1, 2)");
    }

    #[test]
    fn function_call_decodes_with_missing_arguments() {
        let call: FunctionCall = serde_json::from_str(r#"{"name":"noop"}"#).unwrap();
        assert_eq!(call, FunctionCall::new("noop"));
    }
}
