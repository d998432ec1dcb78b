// src/exec/command.rs

//! Shell command actions for tasks defined in `Buildgraph.toml`.

use std::path::PathBuf;
use std::process::Command;

use anyhow::{Context, Result, bail};
use tracing::{debug, info};

use crate::exec::action::{TaskAction, TaskContext};

/// Runs `cmd` through the platform shell and fails on a non-zero exit.
///
/// stdout and stderr are inherited, so task output goes straight to the
/// terminal while logs stay on stderr.
#[derive(Debug, Clone)]
pub struct CommandAction {
    cmd: String,
    workdir: Option<PathBuf>,
}

impl CommandAction {
    pub fn new(cmd: impl Into<String>) -> Self {
        Self {
            cmd: cmd.into(),
            workdir: None,
        }
    }

    /// Run the command from `dir` instead of the current directory.
    pub fn in_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.workdir = Some(dir.into());
        self
    }

    pub fn cmd(&self) -> &str {
        &self.cmd
    }

    fn shell_command(&self) -> Command {
        let mut command = if cfg!(windows) {
            let mut c = Command::new("cmd");
            c.arg("/C").arg(&self.cmd);
            c
        } else {
            let mut c = Command::new("sh");
            c.arg("-c").arg(&self.cmd);
            c
        };
        if let Some(dir) = &self.workdir {
            command.current_dir(dir);
        }
        command
    }
}

impl TaskAction for CommandAction {
    fn execute(&self, ctx: &TaskContext<'_>) -> Result<()> {
        let task = ctx.task();
        info!(task = %task, cmd = %self.cmd, "starting task process");

        let status = self
            .shell_command()
            .status()
            .with_context(|| format!("spawning process for task '{task}'"))?;

        let code = status.code().unwrap_or(-1);
        debug!(task = %task, exit_code = code, success = status.success(), "task process exited");

        if !status.success() {
            bail!("command `{}` exited with code {code}", self.cmd);
        }
        Ok(())
    }

    fn describe(&self) -> Option<String> {
        Some(self.cmd.clone())
    }
}
