//! Crawler task records and reconciliation.
//!
//! Task updates arrive as partial records over the realtime channel and
//! are merged field-by-field into the shared list. Identity (`task_id`)
//! never changes; records are never removed by the channel itself, and the
//! list is only cleared when a caller resets it.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::{Arc, RwLock};

/// A crawler task as reported by the server.
///
/// Beyond the identity, the shape is open-ended: status, progress,
/// message, timestamps and whatever else the server includes are kept in
/// the flattened field map and merged individually on update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    /// Unique, immutable task identity.
    pub task_id: String,
    /// All remaining fields, merged key-by-key on reconciliation.
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl TaskRecord {
    /// Convenience accessor for the `status` field.
    pub fn status(&self) -> Option<&str> {
        self.fields.get("status").and_then(Value::as_str)
    }

    /// Overwrite the supplied fields, leaving everything else (including
    /// the identity) untouched.
    fn merge_from(&mut self, update: &TaskRecord) {
        for (key, value) in &update.fields {
            self.fields.insert(key.clone(), value.clone());
        }
    }
}

/// Shared, observer-readable task collection.
///
/// Mutation happens only in the channel's message handler; any number of
/// readers may snapshot concurrently. Updates append or merge, never
/// remove, so a reader never sees a record disappear mid-read.
#[derive(Debug, Clone, Default)]
pub struct TaskList {
    inner: Arc<RwLock<Vec<TaskRecord>>>,
}

impl TaskList {
    /// Empty list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reconcile one update: merge into the record with the same
    /// `task_id`, or append when unseen.
    pub fn apply(&self, update: TaskRecord) {
        let mut tasks = self.inner.write().expect("task list lock poisoned");
        match tasks.iter_mut().find(|t| t.task_id == update.task_id) {
            Some(existing) => existing.merge_from(&update),
            None => tasks.push(update),
        }
    }

    /// Copy of the current records.
    pub fn snapshot(&self) -> Vec<TaskRecord> {
        self.inner.read().expect("task list lock poisoned").clone()
    }

    /// Number of tracked tasks.
    pub fn len(&self) -> usize {
        self.inner.read().expect("task list lock poisoned").len()
    }

    /// True when no tasks are tracked.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Replace the whole list (e.g. with a fresh REST listing).
    pub fn set(&self, tasks: Vec<TaskRecord>) {
        *self.inner.write().expect("task list lock poisoned") = tasks;
    }

    /// Clear the list.
    pub fn reset(&self) {
        self.inner.write().expect("task list lock poisoned").clear();
    }
}
