//! Rebuild and hot-swap of the VM module.
//!
//! Coordinates the process of:
//! 1. Syncing the source checkout to the remote branch
//! 2. Regenerating the build configuration
//! 3. Building the module
//! 4. Swapping the new module in through the execution gate
//!
//! The first failing stage stops the rebuild. Until the final swap nothing
//! touches the loaded module, so a failed rebuild leaves it serving.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::config::RebuildConfig;
use crate::error::{Error, Result};
use crate::gate::ExecutionGate;
use crate::native::NativeModule;

use super::command::{CommandRunner, StageCommand};
use super::progress::{ProgressSink, RebuildOutcome, RebuildProgress, RebuildStage};

/// Reported when the rebuilt module cannot be loaded. The full error is logged.
const RELOAD_FAILED_REASON: &str = "VM module could not be loaded";

/// Sequences the rebuild stages and the final reload.
pub struct RebuildPipeline {
    config: RebuildConfig,
    /// Artifact produced by the build and loaded afterwards.
    module_path: PathBuf,
    runner: Arc<dyn CommandRunner>,
    /// Held for the duration of a rebuild; a second trigger queues behind it.
    running: Mutex<()>,
}

impl RebuildPipeline {
    pub fn new(
        config: RebuildConfig,
        module_path: impl Into<PathBuf>,
        runner: Arc<dyn CommandRunner>,
    ) -> Self {
        Self {
            config,
            module_path: module_path.into(),
            runner,
            running: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &RebuildConfig {
        &self.config
    }

    /// Commands that reset the checkout to the remote branch.
    pub fn sync_commands(&self) -> Vec<StageCommand> {
        vec![
            StageCommand::new("git", ["reset", "--hard"]),
            StageCommand::new("git", ["fetch", "--all"]),
            StageCommand::new("git", ["checkout", self.config.branch.as_str()]),
            StageCommand::new("git", ["reset", "--hard", self.config.remote_branch().as_str()]),
            StageCommand::new("git", ["pull"]),
        ]
    }

    /// Commands that regenerate the build tree, with the env overrides.
    pub fn configure_commands(&self) -> Vec<StageCommand> {
        vec![
            StageCommand::new("cmake", ["."]).with_env(&self.config.env),
            StageCommand::new("make", ["clean"]).with_env(&self.config.env),
        ]
    }

    /// Commands that build the module artifact.
    pub fn build_commands(&self) -> Vec<StageCommand> {
        let jobs = self.config.jobs.to_string();
        vec![StageCommand::new(
            "make",
            [self.config.build_target.as_str(), "-j", jobs.as_str()],
        )]
    }

    /// Run a full rebuild and report its progress.
    ///
    /// `sink` sees the progress after every step. The returned progress
    /// always carries a terminal outcome.
    pub async fn run(
        &self,
        gate: &ExecutionGate<NativeModule>,
        sink: &dyn ProgressSink,
    ) -> RebuildProgress {
        let _running = self.running.lock().await;
        let mut progress = RebuildProgress::new();

        match self.run_stages(gate, &mut progress, sink).await {
            Ok(()) => {
                tracing::info!("Rebuild finished");
                progress.push(RebuildStage::Reload, "VM has been rebuilt!");
                progress.finish(RebuildOutcome::Success);
            }
            Err(e) => {
                let (stage, reason) = match e {
                    Error::PipelineStage { stage, reason } => (stage, reason),
                    other => (RebuildStage::Reload, other.to_string()),
                };
                tracing::error!("Rebuild failed during {}: {}", stage, reason);
                progress.push(stage, format!("Error: {reason}"));
                progress.finish(RebuildOutcome::Failed { stage, reason });
            }
        }

        sink.on_progress(&progress);
        progress
    }

    async fn run_stages(
        &self,
        gate: &ExecutionGate<NativeModule>,
        progress: &mut RebuildProgress,
        sink: &dyn ProgressSink,
    ) -> Result<()> {
        step(progress, sink, RebuildStage::Sync, "Pulling changes...");
        self.run_commands(RebuildStage::Sync, self.sync_commands())
            .await?;

        let cache_file = self.config.cache_file.clone();
        step(
            progress,
            sink,
            RebuildStage::Configure,
            format!("Deleting {cache_file}"),
        );
        self.remove_cache_file().await?;

        step(progress, sink, RebuildStage::Configure, "Running cmake...");
        self.run_commands(RebuildStage::Configure, self.configure_commands())
            .await?;

        step(progress, sink, RebuildStage::Build, "Building...");
        self.run_commands(RebuildStage::Build, self.build_commands())
            .await?;

        step(progress, sink, RebuildStage::Reload, "Loading VM...");
        let module_path = self.module_path.clone();
        gate.with_gate(move |module| module.reload(&module_path))
            .await
            .map_err(|e| {
                tracing::error!("Failed to load rebuilt module: {}", e);
                Error::PipelineStage {
                    stage: RebuildStage::Reload,
                    reason: RELOAD_FAILED_REASON.to_string(),
                }
            })
    }

    async fn run_commands(&self, stage: RebuildStage, commands: Vec<StageCommand>) -> Result<()> {
        let runner = Arc::clone(&self.runner);
        let cwd = self.config.source_dir.clone();

        let result = tokio::task::spawn_blocking(move || {
            commands
                .iter()
                .try_for_each(|command| runner.run(command, &cwd))
        })
        .await
        .unwrap_or_else(|e| Err(Error::WorkerPanicked(e.to_string())));

        result.map_err(|e| stage_error(stage, e))
    }

    async fn remove_cache_file(&self) -> Result<()> {
        let path = self.config.source_dir.join(&self.config.cache_file);

        let result = tokio::task::spawn_blocking(move || match std::fs::remove_file(&path) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(Error::Io(e)),
            _ => Ok(()),
        })
        .await
        .unwrap_or_else(|e| Err(Error::WorkerPanicked(e.to_string())));

        result.map_err(|e| stage_error(RebuildStage::Configure, e))
    }
}

fn step(
    progress: &mut RebuildProgress,
    sink: &dyn ProgressSink,
    stage: RebuildStage,
    message: impl Into<String>,
) {
    let message = message.into();
    tracing::info!("Rebuild {}: {}", stage, message);
    progress.push(stage, message);
    sink.on_progress(progress);
}

fn stage_error(stage: RebuildStage, e: Error) -> Error {
    Error::PipelineStage {
        stage,
        reason: e.to_string(),
    }
}
