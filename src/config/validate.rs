// src/config/validate.rs

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::{BuildgraphError, Result};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = BuildgraphError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(raw.config, raw.task))
    }
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    ensure_has_tasks(cfg)?;
    validate_global_config(cfg)?;
    validate_task_names(cfg)?;
    validate_task_dependencies(cfg)?;
    validate_default_tasks(cfg)?;
    Ok(())
}

fn ensure_has_tasks(cfg: &RawConfigFile) -> Result<()> {
    if cfg.task.is_empty() {
        return Err(BuildgraphError::ConfigError(
            "config must contain at least one [task.<name>] section".to_string(),
        ));
    }
    Ok(())
}

fn validate_global_config(cfg: &RawConfigFile) -> Result<()> {
    if cfg.config.workers == 0 {
        return Err(BuildgraphError::ConfigError(
            "[config].workers must be >= 1 (got 0)".to_string(),
        ));
    }
    Ok(())
}

fn validate_task_names(cfg: &RawConfigFile) -> Result<()> {
    for name in cfg.task.keys() {
        if name.trim().is_empty() {
            return Err(BuildgraphError::ConfigError(
                "task names must not be empty".to_string(),
            ));
        }
    }
    Ok(())
}

// Self-references and longer loops are left to the controller, which reports
// the whole chain.
fn validate_task_dependencies(cfg: &RawConfigFile) -> Result<()> {
    for (name, task) in cfg.task.iter() {
        for dep in task.after.iter() {
            if !cfg.task.contains_key(dep) {
                return Err(BuildgraphError::ConfigError(format!(
                    "task '{}' has unknown dependency '{}' in `after`",
                    name, dep
                )));
            }
        }
    }
    Ok(())
}

fn validate_default_tasks(cfg: &RawConfigFile) -> Result<()> {
    for name in cfg.config.default_tasks.iter() {
        if !cfg.task.contains_key(name) {
            return Err(BuildgraphError::ConfigError(format!(
                "[config].default_tasks refers to unknown task '{}'",
                name
            )));
        }
    }
    Ok(())
}
