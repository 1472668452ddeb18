//! # OS signal hook.
//!
//! [`wait_for_shutdown_signal`] completes when the process receives a termination
//! signal; `SignalListener` forwards that signal into a batch's [`CancellationToken`].
//!
//! ## Signals
//! `SIGINT`, `SIGTERM` and `SIGQUIT`. The listener only cancels the token; the dispatcher
//! then terminates running jobs and sweeps orphans before the batch returns.
//!
//! Handlers are registered before [`SignalListener::install`] returns, so a signal that
//! arrives once the first job is spawned is never lost to the default disposition.

use tokio::signal::unix::{Signal, SignalKind, signal};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Registered termination signal streams.
struct Termination {
    int: Signal,
    term: Signal,
    quit: Signal,
}

impl Termination {
    fn register() -> std::io::Result<Self> {
        Ok(Self {
            int: signal(SignalKind::interrupt())?,
            term: signal(SignalKind::terminate())?,
            quit: signal(SignalKind::quit())?,
        })
    }

    async fn recv(&mut self) -> &'static str {
        tokio::select! {
            _ = self.int.recv() => "SIGINT",
            _ = self.term.recv() => "SIGTERM",
            _ = self.quit.recv() => "SIGQUIT",
        }
    }
}

/// Resolves with the name of the first termination signal received.
///
/// Listeners are registered per call; registration failure is returned as `Err`.
pub async fn wait_for_shutdown_signal() -> std::io::Result<&'static str> {
    let mut signals = Termination::register()?;
    Ok(signals.recv().await)
}

/// Background task cancelling a token on the first termination signal.
///
/// The listener is stopped when dropped.
#[derive(Debug)]
pub(crate) struct SignalListener {
    handle: JoinHandle<()>,
}

impl SignalListener {
    /// Registers the handlers, then spawns the forwarding task.
    ///
    /// Returns `None` (after logging) when handlers cannot be registered.
    pub fn install(token: CancellationToken) -> Option<Self> {
        let mut signals = match Termination::register() {
            Ok(signals) => signals,
            Err(err) => {
                tracing::warn!(error = %err, "signal listener unavailable");
                return None;
            }
        };
        let handle = tokio::spawn(async move {
            tokio::select! {
                name = signals.recv() => {
                    tracing::warn!(signal = name, "termination signal received; interrupting batch");
                    token.cancel();
                }
                _ = token.cancelled() => {}
            }
        });
        Some(Self { handle })
    }
}

impl Drop for SignalListener {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
