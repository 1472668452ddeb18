//! # Single-consumer relay from the update channel to observers.
//!
//! [`Relay::drain`] reads [`Message`]s and delivers each [`Update`] to every registered
//! [`UpdateObserver`] by calling the method that matches its [`Status`].
//!
//! ## Architecture
//! ```text
//! UpdateStream ──► Relay::drain(expect)
//!                     ├─ validate (index range, one terminal per index)
//!                     └─ for obs in observers (registration order):
//!                          Started ─► obs.on_started(&up)
//!                          Done    ─► obs.on_done(&up)
//!                          Timeout ─► obs.on_timeout(&up)
//!                          Failed  ─► obs.on_failed(&up)
//!                          Err / panic ─► logged, next observer
//! ```
//!
//! ## Stop conditions
//! - [`Expect::Count(n)`](Expect::Count): a terminal update was seen for every index `0..n`
//! - [`Expect::Sentinel`]: [`Message::Sentinel`] arrives
//! - either mode: Sentinel, or every sink dropped
//!
//! ## Rules
//! - **Fault isolation**: one observer failing (error or panic) never blocks the others
//!   nor the relay loop.
//! - **Fatal protocol violations**: out-of-range index (bounded mode), a second terminal
//!   for an index, or a start after settlement stop the relay with [`BusError`].

use std::any::Any;
use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;

use super::channel::UpdateStream;
use super::update::{Message, Status, Update};
use crate::error::{BusError, ObserverError};
use crate::fanout::Fanout;

/// Low-level observer of job updates.
///
/// Every method defaults to a no-op, implement the ones you need.
///
/// ### Implementation requirements
/// - Use async I/O; avoid blocking the executor.
/// - Return `Err` for reportable failures; the relay logs it and carries on.
#[async_trait]
pub trait UpdateObserver: Send + Sync + 'static {
    /// A job's process has started.
    async fn on_started(&self, _update: &Update) -> Result<(), ObserverError> {
        Ok(())
    }

    /// A job exited successfully.
    async fn on_done(&self, _update: &Update) -> Result<(), ObserverError> {
        Ok(())
    }

    /// A job was terminated on timeout or interrupt.
    async fn on_timeout(&self, _update: &Update) -> Result<(), ObserverError> {
        Ok(())
    }

    /// A job failed.
    async fn on_failed(&self, _update: &Update) -> Result<(), ObserverError> {
        Ok(())
    }

    /// Observer name used in logs.
    ///
    /// The default uses `type_name::<Self>()`, which can be verbose - override it when possible.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// When [`Relay::drain`] may stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expect {
    /// Bounded mode: stop after a terminal update for every index `0..n`.
    Count(usize),
    /// Unbounded mode: stop at the sentinel.
    Sentinel,
}

/// Counters collected while draining.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayStats {
    /// Updates delivered to observers.
    pub delivered: usize,
    /// Distinct indices that reached a terminal status.
    pub settled: usize,
    /// Observer callbacks that returned an error or panicked.
    pub observer_faults: usize,
}

/// Relay from an update stream to a fan-out of observers.
#[derive(Debug, Default)]
pub struct Relay {
    observers: Fanout<dyn UpdateObserver>,
}

impl Relay {
    /// Creates a relay delivering to the given observers, in order.
    #[must_use]
    pub fn new(observers: Vec<Arc<dyn UpdateObserver>>) -> Self {
        Self {
            observers: Fanout::with_subscribers(observers),
        }
    }

    /// The observer list (add/remove while the relay runs is allowed).
    pub fn observers(&self) -> &Fanout<dyn UpdateObserver> {
        &self.observers
    }

    /// Drains the stream until the stop condition of `expect` holds.
    pub async fn drain(
        &self,
        mut stream: UpdateStream,
        expect: Expect,
    ) -> Result<RelayStats, BusError> {
        let mut stats = RelayStats::default();
        let mut settled: HashSet<usize> = HashSet::new();

        while !Self::satisfied(expect, settled.len()) {
            let up = match stream.recv().await {
                Some(Message::Update(up)) => up,
                Some(Message::Sentinel) | None => break,
            };
            Self::validate(&up, expect, &settled)?;

            if up.is_terminal() {
                settled.insert(up.index);
            }
            stats.observer_faults += self.deliver(&up).await;
            stats.delivered += 1;
        }

        stats.settled = settled.len();
        Ok(stats)
    }

    fn satisfied(expect: Expect, settled: usize) -> bool {
        match expect {
            Expect::Count(n) => settled >= n,
            Expect::Sentinel => false,
        }
    }

    fn validate(up: &Update, expect: Expect, settled: &HashSet<usize>) -> Result<(), BusError> {
        if let Expect::Count(n) = expect {
            if up.index >= n {
                return Err(BusError::UnknownIndex {
                    index: up.index,
                    expected: n,
                });
            }
        }
        if settled.contains(&up.index) {
            return Err(if up.is_terminal() {
                BusError::DuplicateTerminal { index: up.index }
            } else {
                BusError::StartedAfterTerminal { index: up.index }
            });
        }
        Ok(())
    }

    /// Delivers one update to every observer; returns the number of faults.
    async fn deliver(&self, up: &Update) -> usize {
        let mut faults = 0;
        for obs in self.observers.snapshot() {
            let fut = match up.status {
                Status::Started => obs.on_started(up),
                Status::Done => obs.on_done(up),
                Status::Timeout => obs.on_timeout(up),
                Status::Failed => obs.on_failed(up),
            };
            match AssertUnwindSafe(fut).catch_unwind().await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    faults += 1;
                    tracing::warn!(
                        observer = obs.name(),
                        index = up.index,
                        status = %up.status,
                        error = %err,
                        "observer failed"
                    );
                }
                Err(panic) => {
                    faults += 1;
                    tracing::error!(
                        observer = obs.name(),
                        index = up.index,
                        status = %up.status,
                        panic = %panic_message(&*panic),
                        "observer panicked"
                    );
                }
            }
        }
        faults
    }
}

pub(crate) fn panic_message(any: &(dyn Any + Send)) -> String {
    if let Some(msg) = any.downcast_ref::<&'static str>() {
        (*msg).to_string()
    } else if let Some(msg) = any.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::channel;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<(Status, usize)>>,
    }

    impl Recorder {
        fn push(&self, up: &Update) -> Result<(), ObserverError> {
            self.seen.lock().unwrap().push((up.status, up.index));
            Ok(())
        }
    }

    #[async_trait]
    impl UpdateObserver for Recorder {
        async fn on_started(&self, up: &Update) -> Result<(), ObserverError> {
            self.push(up)
        }
        async fn on_done(&self, up: &Update) -> Result<(), ObserverError> {
            self.push(up)
        }
        async fn on_timeout(&self, up: &Update) -> Result<(), ObserverError> {
            self.push(up)
        }
        async fn on_failed(&self, up: &Update) -> Result<(), ObserverError> {
            self.push(up)
        }
    }

    struct Exploding;

    #[async_trait]
    impl UpdateObserver for Exploding {
        async fn on_started(&self, _up: &Update) -> Result<(), ObserverError> {
            panic!("boom");
        }
        async fn on_done(&self, _up: &Update) -> Result<(), ObserverError> {
            Err(ObserverError::Other("nope".into()))
        }
        fn name(&self) -> &'static str {
            "exploding"
        }
    }

    #[tokio::test]
    async fn bounded_drain_stops_after_every_index_settles() {
        let (sink, stream) = channel();
        sink.publish(Update::new(Status::Started, 1, "b"));
        sink.publish(Update::new(Status::Started, 0, "a"));
        sink.publish(Update::new(Status::Done, 1, "b"));
        sink.publish(Update::new(Status::Failed, 0, "a"));
        // Never read: the relay stops at the second terminal.
        sink.publish(Update::new(Status::Done, 0, "a"));

        let rec = Arc::new(Recorder::default());
        let relay = Relay::new(vec![rec.clone()]);
        let stats = relay.drain(stream, Expect::Count(2)).await.unwrap();

        assert_eq!(stats.settled, 2);
        assert_eq!(stats.delivered, 4);
        assert_eq!(
            *rec.seen.lock().unwrap(),
            vec![
                (Status::Started, 1),
                (Status::Started, 0),
                (Status::Done, 1),
                (Status::Failed, 0)
            ]
        );
    }

    #[tokio::test]
    async fn faulty_observer_does_not_starve_the_rest() {
        let (sink, stream) = channel();
        sink.publish(Update::new(Status::Started, 0, "a"));
        sink.publish(Update::new(Status::Done, 0, "a"));

        let rec = Arc::new(Recorder::default());
        let relay = Relay::new(vec![Arc::new(Exploding), rec.clone()]);
        let stats = relay.drain(stream, Expect::Count(1)).await.unwrap();

        assert_eq!(stats.observer_faults, 2);
        assert_eq!(rec.seen.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn sentinel_mode_waits_for_sentinel() {
        let (sink, stream) = channel();
        sink.publish(Update::new(Status::Done, 9, "x"));
        sink.publish(Update::new(Status::Done, 3, "y"));
        sink.sentinel();
        sink.publish(Update::new(Status::Done, 4, "z"));

        let relay = Relay::default();
        let stats = relay.drain(stream, Expect::Sentinel).await.unwrap();
        assert_eq!(stats.settled, 2);
    }

    #[tokio::test]
    async fn malformed_traffic_is_fatal() {
        let (sink, stream) = channel();
        sink.publish(Update::new(Status::Done, 5, "x"));
        let err = Relay::default()
            .drain(stream, Expect::Count(2))
            .await
            .unwrap_err();
        assert_eq!(err, BusError::UnknownIndex { index: 5, expected: 2 });

        let (sink, stream) = channel();
        sink.publish(Update::new(Status::Done, 0, "x"));
        sink.publish(Update::new(Status::Timeout, 0, "x"));
        let err = Relay::default()
            .drain(stream, Expect::Sentinel)
            .await
            .unwrap_err();
        assert_eq!(err, BusError::DuplicateTerminal { index: 0 });

        let (sink, stream) = channel();
        sink.publish(Update::new(Status::Done, 0, "x"));
        sink.publish(Update::new(Status::Started, 0, "x"));
        let err = Relay::default()
            .drain(stream, Expect::Sentinel)
            .await
            .unwrap_err();
        assert_eq!(err, BusError::StartedAfterTerminal { index: 0 });
    }

    #[tokio::test]
    async fn closed_channel_ends_drain() {
        let (sink, stream) = channel();
        sink.publish(Update::new(Status::Started, 0, "a"));
        drop(sink);
        let stats = Relay::default()
            .drain(stream, Expect::Count(3))
            .await
            .unwrap();
        assert_eq!(stats.settled, 0);
        assert_eq!(stats.delivered, 1);
    }
}
