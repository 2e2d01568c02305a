//! Rebuild progress reporting.

use std::fmt;

use serde::Serialize;

/// Stages of a rebuild.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RebuildStage {
    /// Update the source checkout.
    Sync,
    /// Regenerate the build configuration.
    Configure,
    /// Build the module artifact.
    Build,
    /// Swap the new module in.
    Reload,
}

impl fmt::Display for RebuildStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Sync => "sync",
            Self::Configure => "configure",
            Self::Build => "build",
            Self::Reload => "reload",
        };
        f.write_str(name)
    }
}

/// Terminal outcome of a rebuild.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum RebuildOutcome {
    Success,
    Failed { stage: RebuildStage, reason: String },
}

/// One progress message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgressEntry {
    pub stage: RebuildStage,
    pub message: String,
}

/// Append-only log of one rebuild.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RebuildProgress {
    entries: Vec<ProgressEntry>,
    outcome: Option<RebuildOutcome>,
}

impl RebuildProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, stage: RebuildStage, message: impl Into<String>) {
        self.entries.push(ProgressEntry {
            stage,
            message: message.into(),
        });
    }

    pub fn entries(&self) -> &[ProgressEntry] {
        &self.entries
    }

    /// `None` while the rebuild is still running.
    pub fn outcome(&self) -> Option<&RebuildOutcome> {
        self.outcome.as_ref()
    }

    pub fn is_success(&self) -> bool {
        self.outcome == Some(RebuildOutcome::Success)
    }

    pub(crate) fn finish(&mut self, outcome: RebuildOutcome) {
        self.outcome = Some(outcome);
    }

    /// Messages in order.
    pub fn messages(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.message.as_str())
    }
}

impl fmt::Display for RebuildProgress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "```")?;
        let mut first = true;
        for message in self.messages() {
            if !first {
                writeln!(f)?;
            }
            f.write_str(message)?;
            first = false;
        }
        write!(f, "```")
    }
}

/// Receives progress as a rebuild advances.
pub trait ProgressSink: Send + Sync {
    /// Called after every appended message with the progress so far.
    fn on_progress(&self, progress: &RebuildProgress);
}

impl<F> ProgressSink for F
where
    F: Fn(&RebuildProgress) + Send + Sync,
{
    fn on_progress(&self, progress: &RebuildProgress) {
        self(progress)
    }
}
