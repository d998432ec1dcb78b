// src/graph/node.rs

//! Task nodes stored in the work graph arena.

use std::fmt;
use std::sync::Arc;

use crate::exec::TaskAction;
use crate::types::{NodeId, TaskPath};

/// A named unit of schedulable work plus its outgoing dependency edges.
///
/// Successors are the tasks that must complete before this one. They are
/// pre-resolved arena indices, kept in declaration order without duplicates.
#[derive(Clone)]
pub struct TaskNode {
    pub(crate) id: NodeId,
    pub(crate) path: TaskPath,
    pub(crate) successors: Vec<NodeId>,
    pub(crate) action: Option<Arc<dyn TaskAction>>,
    pub(crate) description: Option<String>,
    /// `false` while the node only exists because something referenced it.
    pub(crate) defined: bool,
}

impl TaskNode {
    pub(crate) fn placeholder(id: NodeId, path: TaskPath) -> Self {
        Self {
            id,
            path,
            successors: Vec::new(),
            action: None,
            description: None,
            defined: false,
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn path(&self) -> &TaskPath {
        &self.path
    }

    pub fn successors(&self) -> &[NodeId] {
        &self.successors
    }

    pub fn action(&self) -> Option<&Arc<dyn TaskAction>> {
        self.action.as_ref()
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn is_defined(&self) -> bool {
        self.defined
    }

    pub(crate) fn add_successor(&mut self, dep: NodeId) -> bool {
        if self.successors.contains(&dep) {
            return false;
        }
        self.successors.push(dep);
        true
    }
}

impl fmt::Debug for TaskNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskNode")
            .field("id", &self.id)
            .field("path", &self.path)
            .field("successors", &self.successors)
            .field("has_action", &self.action.is_some())
            .field("defined", &self.defined)
            .finish()
    }
}
