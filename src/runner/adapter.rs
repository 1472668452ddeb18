//! # Update → progress callback translation.
//!
//! [`ProgressAdapter`] sits on the relay as an [`UpdateObserver`] and turns raw updates
//! into [`ProgressObserver`] callbacks carrying the caller's experiment.
//!
//! ```text
//! Started ─► job_started(i, e)
//! Done    ─► [reload e] ─► job_finished(i, e)
//! Timeout ─► job_interrupted(i, e)
//! Failed  ─► [reload e] ─► job_failed(i, e)
//! ```
//!
//! `i` is the batch index; it selects the experiment among the ones submitted, in
//! submission order. Reloads only happen when the observer asks for them and a storage
//! is configured.

use std::sync::Arc;

use async_trait::async_trait;

use crate::bus::{Update, UpdateObserver};
use crate::error::ObserverError;
use crate::observers::ProgressObserver;
use crate::storage::{Experiment, Storage};

/// Relay observer reporting to a [`ProgressObserver`].
pub struct ProgressAdapter<E: Experiment> {
    submitted: Vec<E>,
    observer: Arc<dyn ProgressObserver<E>>,
    storage: Option<Arc<dyn Storage<E>>>,
}

impl<E: Experiment> ProgressAdapter<E> {
    /// `submitted[i]` is the experiment of batch index `i`.
    pub fn new(
        submitted: Vec<E>,
        observer: Arc<dyn ProgressObserver<E>>,
        storage: Option<Arc<dyn Storage<E>>>,
    ) -> Self {
        let storage = storage.filter(|_| observer.auto_reload());
        Self {
            submitted,
            observer,
            storage,
        }
    }

    fn experiment(&self, up: &Update) -> Result<&E, ObserverError> {
        self.submitted
            .get(up.index)
            .ok_or_else(|| ObserverError::Other(format!("no experiment for index {}", up.index)))
    }

    /// Calls `notify` with the freshest copy of the experiment.
    ///
    /// A failed reload still notifies, with the submitted copy, and is then reported.
    async fn settle<F>(&self, up: &Update, notify: F) -> Result<(), ObserverError>
    where
        F: Fn(&dyn ProgressObserver<E>, usize, &E) + Send,
    {
        let current = self.experiment(up)?;
        let Some(storage) = &self.storage else {
            notify(self.observer.as_ref(), up.index, current);
            return Ok(());
        };
        match storage.reload(current).await {
            Ok(fresh) => {
                notify(self.observer.as_ref(), up.index, &fresh);
                Ok(())
            }
            Err(err) => {
                notify(self.observer.as_ref(), up.index, current);
                Err(err.into())
            }
        }
    }
}

#[async_trait]
impl<E: Experiment> UpdateObserver for ProgressAdapter<E> {
    async fn on_started(&self, up: &Update) -> Result<(), ObserverError> {
        let e = self.experiment(up)?;
        self.observer.job_started(up.index, e);
        Ok(())
    }

    async fn on_done(&self, up: &Update) -> Result<(), ObserverError> {
        self.settle(up, |obs, i, e| obs.job_finished(i, e)).await
    }

    async fn on_timeout(&self, up: &Update) -> Result<(), ObserverError> {
        let e = self.experiment(up)?;
        self.observer.job_interrupted(up.index, e);
        Ok(())
    }

    async fn on_failed(&self, up: &Update) -> Result<(), ObserverError> {
        self.settle(up, |obs, i, e| obs.job_failed(i, e)).await
    }

    fn name(&self) -> &'static str {
        "progress_adapter"
    }
}
