//! External commands run by rebuild stages.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::error::{Error, Result};

/// A single external command of a stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageCommand {
    pub program: String,
    pub args: Vec<String>,
    /// Variables added on top of the inherited environment.
    pub env: BTreeMap<String, String>,
}

impl StageCommand {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            env: BTreeMap::new(),
        }
    }

    pub fn with_env(mut self, env: &BTreeMap<String, String>) -> Self {
        self.env.extend(env.iter().map(|(k, v)| (k.clone(), v.clone())));
        self
    }
}

impl fmt::Display for StageCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Runs stage commands to completion.
///
/// Implementations block; the pipeline calls them from the blocking pool.
pub trait CommandRunner: Send + Sync {
    /// Run `command` in `cwd`. Any non-zero exit is an error.
    fn run(&self, command: &StageCommand, cwd: &Path) -> Result<()>;
}

/// Runs commands as child processes.
#[derive(Debug, Clone, Default)]
pub struct SystemRunner;

impl SystemRunner {
    /// Find a program in PATH.
    fn resolve(program: &str) -> Result<PathBuf> {
        which::which(program).map_err(|_| Error::Command {
            command: program.to_string(),
            message: format!("{program} not found in PATH"),
        })
    }
}

impl CommandRunner for SystemRunner {
    fn run(&self, command: &StageCommand, cwd: &Path) -> Result<()> {
        let program = Self::resolve(&command.program)?;
        tracing::info!("Running: {}", command);

        let output = Command::new(program)
            .args(&command.args)
            .envs(&command.env)
            .current_dir(cwd)
            .output()
            .map_err(|e| Error::Command {
                command: command.to_string(),
                message: format!("failed to start: {e}"),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stderr = stderr.trim();
            let message = if stderr.is_empty() {
                output.status.to_string()
            } else {
                format!("{}: {}", output.status, stderr)
            };
            return Err(Error::Command {
                command: command.to_string(),
                message,
            });
        }

        tracing::debug!(
            "{} finished: {}",
            command,
            String::from_utf8_lossy(&output.stdout).trim()
        );
        Ok(())
    }
}
