// src/config/model.rs

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::types::FailurePolicy;

/// Configuration exactly as read from a `Buildgraph.toml` file.
///
/// ```toml
/// [config]
/// workers = 2
/// failure_policy = "failfast"
/// default_tasks = ["build"]
///
/// [task.generate]
/// cmd = "./gen.sh"
///
/// [task.build]
/// cmd = "cargo build"
/// after = ["generate"]
/// ```
///
/// Nothing here has been validated; convert with `ConfigFile::try_from`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawConfigFile {
    #[serde(default)]
    pub config: ConfigSection,

    /// All tasks from `[task.<name>]`, keyed by task name.
    #[serde(default)]
    pub task: BTreeMap<String, TaskConfig>,
}

/// A validated configuration.
///
/// Every `after` and `default_tasks` entry names a defined task and the
/// worker count is at least 1. Dependency cycles are *not* rejected here;
/// the build controller reports them with the full chain.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub config: ConfigSection,
    pub task: BTreeMap<String, TaskConfig>,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(config: ConfigSection, task: BTreeMap<String, TaskConfig>) -> Self {
        Self { config, task }
    }

    /// Task names, sorted.
    pub fn task_names(&self) -> impl Iterator<Item = &str> {
        self.task.keys().map(String::as_str)
    }

    /// Tasks to queue when none are requested explicitly: `default_tasks`
    /// if set, otherwise every task in the file.
    pub fn default_entry_points(&self) -> Vec<String> {
        if self.config.default_tasks.is_empty() {
            self.task_names().map(str::to_owned).collect()
        } else {
            self.config.default_tasks.clone()
        }
    }
}

/// `[config]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigSection {
    /// Size of the worker lease pool.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// `"failfast"` (default) or `"continue"`.
    #[serde(default)]
    pub failure_policy: FailurePolicy,

    #[serde(default)]
    pub default_tasks: Vec<String>,
}

fn default_workers() -> usize {
    2
}

impl Default for ConfigSection {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            failure_policy: FailurePolicy::default(),
            default_tasks: Vec::new(),
        }
    }
}

/// `[task.<name>]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct TaskConfig {
    /// Shell command to run. A task without one only groups its dependencies.
    #[serde(default)]
    pub cmd: Option<String>,

    /// This task waits for every task listed here.
    #[serde(default)]
    pub after: Vec<String>,

    #[serde(default)]
    pub description: Option<String>,

    /// `false` keeps the task in the plan but skips running it.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            cmd: None,
            after: Vec::new(),
            description: None,
            enabled: default_enabled(),
        }
    }
}
