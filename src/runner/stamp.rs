//! Batch metadata stamped onto every submitted experiment.

use std::time::Duration;

use chrono::{DateTime, Local};
use serde::Serialize;

/// Run number, host and start time shared by every job of one batch.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BatchStamp {
    /// Run number from storage (`None` without storage).
    pub run_id: Option<u64>,
    /// Host the batch runs on.
    pub host: String,
    /// Wall-clock start of the batch.
    pub started_at: DateTime<Local>,
    /// Default job timeout of the batch.
    pub timeout: Option<Duration>,
    /// Storage group the batch belongs to.
    pub group: Option<String>,
}

impl BatchStamp {
    /// Stamp for a batch starting now on this host.
    pub fn now(run_id: Option<u64>, timeout: Option<Duration>) -> Self {
        Self {
            run_id,
            host: hostname(),
            started_at: Local::now(),
            timeout,
            group: None,
        }
    }

    /// Returns the stamp with its storage group set.
    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }
}

fn hostname() -> String {
    match nix::unistd::gethostname() {
        Ok(name) => name.to_string_lossy().into_owned(),
        Err(err) => {
            tracing::debug!(error = %err, "host name unavailable");
            "unknown".to_string()
        }
    }
}
