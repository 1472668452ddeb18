//! # Process-group termination.
//!
//! Every job runs as the leader of its own process group (pgid = pid of the job's
//! process), so signalling the group reaches every descendant that did not start a group
//! of its own.
//!
//! One escalation policy is used for timeouts, batch interrupts and the orphan sweep:
//! ```text
//! SIGTERM ─► group ── gone within `grace`? ── yes ─► done
//!                                         └─ no ──► SIGKILL ─► group
//! ```
//!
//! ## Rules
//! - `ESRCH` (group already gone) counts as success.
//! - `EPERM` is logged and tolerated.

use std::time::Duration;

use nix::errno::Errno;
use nix::sys::signal::{Signal, killpg};
use nix::unistd::Pid;
use tokio::process::Child;
use tokio::time::{Instant, sleep, timeout};

const POLL: Duration = Duration::from_millis(25);

/// Result of delivering one signal to a process group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// The signal was delivered.
    Delivered,
    /// No such process group.
    Gone,
    /// The group exists but may not be signalled by us.
    Denied,
}

/// Sends `signal` to process group `pgid`.
pub fn signal_group(pgid: u32, signal: Signal) -> Delivery {
    let Ok(raw) = i32::try_from(pgid) else {
        return Delivery::Gone;
    };
    if raw <= 1 {
        // 0 and 1 would address our own group or init.
        return Delivery::Gone;
    }
    match killpg(Pid::from_raw(raw), signal) {
        Ok(()) => Delivery::Delivered,
        Err(Errno::ESRCH) => Delivery::Gone,
        Err(Errno::EPERM) => {
            tracing::warn!(pgid, signal = %signal, "not permitted to signal process group");
            Delivery::Denied
        }
        Err(err) => {
            tracing::warn!(pgid, signal = %signal, error = %err, "signalling process group failed");
            Delivery::Denied
        }
    }
}

/// True while process group `pgid` has at least one member we can see.
pub fn group_alive(pgid: u32) -> bool {
    let Ok(raw) = i32::try_from(pgid) else {
        return false;
    };
    if raw <= 1 {
        return false;
    }
    !matches!(killpg(Pid::from_raw(raw), None::<Signal>), Err(Errno::ESRCH))
}

/// Terminates process group `pgid` with the escalation policy.
///
/// When the group leader is our `child`, it is reaped before returning so no zombie is
/// left behind. Returns the delivery of the first signal.
pub async fn terminate_group(pgid: u32, child: Option<&mut Child>, grace: Duration) -> Delivery {
    let first = signal_group(pgid, Signal::SIGTERM);
    let deadline = Instant::now() + grace;

    let mut child = child;
    if first == Delivery::Delivered {
        if let Some(child) = child.as_deref_mut() {
            let _ = timeout(grace, child.wait()).await;
        }
        while group_alive(pgid) && Instant::now() < deadline {
            sleep(POLL).await;
        }
        if group_alive(pgid) {
            tracing::debug!(pgid, "group survived SIGTERM; sending SIGKILL");
            signal_group(pgid, Signal::SIGKILL);
        }
    }

    if let Some(child) = child {
        if !matches!(child.try_wait(), Ok(Some(_))) {
            if let Err(err) = child.kill().await {
                tracing::debug!(pgid, error = %err, "reaping terminated child");
            }
        }
    }
    first
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Stdio;
    use tokio::process::Command;

    #[test]
    fn reserved_group_ids_are_never_signalled() {
        assert_eq!(signal_group(0, Signal::SIGTERM), Delivery::Gone);
        assert_eq!(signal_group(1, Signal::SIGTERM), Delivery::Gone);
        assert!(!group_alive(0));
    }

    #[tokio::test]
    async fn terminate_reaches_grandchildren() {
        let mut child = Command::new("/bin/sh")
            .arg("-c")
            .arg("sleep 30 & sleep 30 & wait")
            .process_group(0)
            .stdout(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .unwrap();
        let pgid = child.id().unwrap();
        sleep(Duration::from_millis(100)).await;
        assert!(group_alive(pgid));

        let first = terminate_group(pgid, Some(&mut child), Duration::from_millis(500)).await;
        assert_eq!(first, Delivery::Delivered);

        let deadline = Instant::now() + Duration::from_secs(5);
        while group_alive(pgid) && Instant::now() < deadline {
            sleep(POLL).await;
        }
        assert!(!group_alive(pgid));
    }

    #[tokio::test]
    async fn terminating_a_finished_group_is_harmless() {
        let mut child = Command::new("/bin/sh")
            .arg("-c")
            .arg("exit 0")
            .process_group(0)
            .spawn()
            .unwrap();
        let pgid = child.id().unwrap();
        child.wait().await.unwrap();
        let first = terminate_group(pgid, Some(&mut child), Duration::from_millis(50)).await;
        assert_eq!(first, Delivery::Gone);
    }
}
