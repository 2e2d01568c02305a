//! Rebuild pipeline for the VM module.
//!
//! # Module Structure
//!
//! - `command` - External stage commands and the runner that executes them
//! - `progress` - Append-only progress log and sinks
//! - `rebuild` - Stage sequencing and the gated hot-swap

mod command;
mod progress;
mod rebuild;

pub use command::{CommandRunner, StageCommand, SystemRunner};
pub use progress::{ProgressEntry, ProgressSink, RebuildOutcome, RebuildProgress, RebuildStage};
pub use rebuild::RebuildPipeline;
