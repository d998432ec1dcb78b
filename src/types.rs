// src/types.rs

//! Small value types shared across the graph, engine and config layers.

use std::borrow::Borrow;
use std::fmt;

use serde::Deserialize;

/// Stable, human-readable identity of a task (e.g. `:app:compile`).
///
/// Paths are unique within a work graph and are what every diagnostic
/// prints, so they are kept exactly as registered.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize)]
#[serde(transparent)]
pub struct TaskPath(String);

impl TaskPath {
    pub fn new(path: impl Into<String>) -> Self {
        TaskPath(path.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TaskPath {
    fn from(s: &str) -> Self {
        TaskPath(s.to_string())
    }
}

impl From<String> for TaskPath {
    fn from(s: String) -> Self {
        TaskPath(s)
    }
}

impl From<&TaskPath> for TaskPath {
    fn from(p: &TaskPath) -> Self {
        p.clone()
    }
}

impl Borrow<str> for TaskPath {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Index of a node inside a work graph's arena.
///
/// Ids are handed out in registration order, which is the order every
/// deterministic traversal (cycle reporting, plan ordering) follows. An id is
/// only meaningful for the graph that issued it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub(crate) fn new(index: usize) -> Self {
        NodeId(index)
    }

    pub fn index(self) -> usize {
        self.0
    }
}

/// What a run does after a task fails.
///
/// - `FailFast`: stop at the first failed task (default).
/// - `Continue`: keep running every task that does not depend on a failed
///   one; dependents of failed tasks are reported as blocked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    #[default]
    FailFast,
    Continue,
}
