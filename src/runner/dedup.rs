//! # Run deduplicator.
//!
//! Decides whether a stored record already covers a setting, so a resumed batch skips
//! finished work.
//!
//! ## Rules
//! - `repeat = true` or no storage: never a match.
//! - Records are fetched once per experiment kind and cached for the batch.
//! - A match needs every setting field equal to the record's field of the same name;
//!   the first matching record wins.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::StorageError;
use crate::storage::{Experiment, RecordId, RunRecord, Setting, Storage};

/// Per-batch matcher of settings against stored records.
pub struct Deduplicator<E: Experiment> {
    storage: Option<Arc<dyn Storage<E>>>,
    repeat: bool,
    group: Option<String>,
    cache: HashMap<String, Vec<RunRecord>>,
}

impl<E: Experiment> Deduplicator<E> {
    /// Matcher over `storage`; lookups are restricted to `group` when given.
    pub fn new(storage: Option<Arc<dyn Storage<E>>>, repeat: bool, group: Option<String>) -> Self {
        Self {
            storage,
            repeat,
            group,
            cache: HashMap::new(),
        }
    }

    /// Identifier of the first stored record of `kind` matching `setting`.
    pub async fn find(&mut self, setting: &Setting, kind: &str) -> Result<Option<RecordId>, StorageError> {
        if self.repeat {
            return Ok(None);
        }
        let Some(storage) = &self.storage else {
            return Ok(None);
        };
        if !self.cache.contains_key(kind) {
            let records = storage.experiments(kind, self.group.as_deref()).await?;
            tracing::debug!(kind, records = records.len(), "loaded stored records");
            self.cache.insert(kind.to_string(), records);
        }
        Ok(self
            .cache
            .get(kind)
            .and_then(|records| records.iter().find(|r| setting.matches(r)))
            .map(|r| r.id))
    }
}
