//! # Collaborator contracts: settings, records, experiments and storage.
//!
//! The runtime does not persist anything itself. A [`Storage`] implementation owns the
//! records; an [`Experiment`] is the caller's job type, turned into a
//! [`JobPayload`](crate::JobPayload) when its batch runs.
//!
//! ```text
//! Trajectory ── (Setting, E) ──► Deduplicator ── Storage::experiments(kind, group)
//!                                    │                 └─ RunRecord { id, fields }
//!                                    ▼
//!                               Storage::save(&mut E) ─► E::payload() ─► JobSpec
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::dispatch::JobPayload;
use crate::error::StorageError;
use crate::runner::BatchStamp;

/// Identifier of a persisted record.
pub type RecordId = u64;

/// Immutable field name → value mapping describing one point of a trajectory.
///
/// Clones share the same map.
///
/// ## Example
/// ```rust
/// use jobvisor::Setting;
///
/// let s = Setting::new().with("a", 1).with("b", "x");
/// assert_eq!(s.get("a"), Some(&serde_json::json!(1)));
/// assert_eq!(s.len(), 2);
/// ```
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Setting {
    fields: Arc<BTreeMap<String, Value>>,
}

impl Setting {
    /// Creates an empty setting.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a setting with `name` set to `value`.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        Arc::make_mut(&mut self.fields).insert(name.into(), value.into());
        self
    }

    /// Value of `name`, if present.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Fields in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// True when the setting has no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// True when every field equals the record's field of the same name.
    ///
    /// A field missing from the record never matches.
    pub fn matches(&self, record: &RunRecord) -> bool {
        self.iter()
            .all(|(name, value)| record.field(name) == Some(value))
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Setting {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let fields = iter
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Self {
            fields: Arc::new(fields),
        }
    }
}

impl From<Map<String, Value>> for Setting {
    fn from(map: Map<String, Value>) -> Self {
        map.into_iter().collect()
    }
}

/// A previously persisted job.
#[derive(Clone, Debug, PartialEq)]
pub struct RunRecord {
    /// Record identifier.
    pub id: RecordId,
    /// Stored field values.
    pub fields: Map<String, Value>,
}

impl RunRecord {
    /// Creates a record from its identifier and stored fields.
    pub fn new(id: RecordId, fields: Map<String, Value>) -> Self {
        Self { id, fields }
    }

    /// Value of the named field.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }
}

/// Caller-defined job type driven by a [`Runner`](crate::Runner).
pub trait Experiment: Clone + Send + Sync + 'static {
    /// Kind used to group stored records (the dedup query key).
    fn kind(&self) -> &str;

    /// Storage identifier, once saved or rebound.
    fn identifier(&self) -> Option<RecordId>;

    /// Rebinds this experiment to a stored record.
    fn set_identifier(&mut self, id: RecordId);

    /// Attaches batch metadata before the experiment is saved.
    fn stamp(&mut self, stamp: &BatchStamp);

    /// What the job runs.
    fn payload(&self) -> JobPayload;
}

/// Named, ordered list of settings and the experiments built for them.
#[derive(Clone, Debug)]
pub struct Trajectory<E> {
    /// Trajectory name (reported to observers, default dedup group).
    pub name: String,
    /// Points of the trajectory, in submission order.
    pub entries: Vec<(Setting, E)>,
}

impl<E> Trajectory<E> {
    /// Creates an empty trajectory; `name` is also the default storage group.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: Vec::new(),
        }
    }

    /// Appends one point.
    pub fn push(mut self, setting: Setting, experiment: E) -> Self {
        self.entries.push((setting, experiment));
        self
    }

    /// Number of points.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when the trajectory has no points.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Persistence backend for experiments of type `E`.
///
/// ### Implementation requirements
/// - `save` assigns an identifier when the experiment has none and persists its stamp.
/// - `reload` returns the stored state of an experiment that has an identifier.
#[async_trait]
pub trait Storage<E: Experiment>: Send + Sync + 'static {
    /// Allocates the next run number.
    async fn new_run(&self) -> Result<u64, StorageError>;

    /// Stored records of `kind`, optionally restricted to `group`.
    async fn experiments(&self, kind: &str, group: Option<&str>) -> Result<Vec<RunRecord>, StorageError>;

    /// Persists `experiment`, assigning its identifier if needed.
    async fn save(&self, experiment: &mut E) -> Result<(), StorageError>;

    /// Reads back the stored state of `experiment`.
    async fn reload(&self, experiment: &E) -> Result<E, StorageError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(id: RecordId, fields: Value) -> RunRecord {
        match fields {
            Value::Object(map) => RunRecord::new(id, map),
            _ => unreachable!(),
        }
    }

    #[test]
    fn settings_match_on_every_field() {
        let s = Setting::new().with("a", 1).with("b", 2);
        assert!(s.matches(&record(1, json!({"a": 1, "b": 2, "extra": true}))));
        assert!(!s.matches(&record(2, json!({"a": 1, "b": 3}))));
        assert!(!s.matches(&record(3, json!({"a": 1}))));
        assert!(!s.matches(&record(4, json!({"a": 1.0, "b": 2}))));
    }

    #[test]
    fn with_does_not_touch_clones() {
        let base = Setting::new().with("a", 1);
        let other = base.clone().with("a", 2);
        assert_eq!(base.get("a"), Some(&json!(1)));
        assert_eq!(other.get("a"), Some(&json!(2)));
    }

    #[test]
    fn collects_from_pairs_and_maps() {
        let s: Setting = [("x", 1), ("y", 2)].into_iter().collect();
        let m = match json!({"x": 1, "y": 2}) {
            Value::Object(m) => m,
            _ => unreachable!(),
        };
        assert_eq!(Setting::from(m), s);
    }
}
