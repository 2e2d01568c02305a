//! Error types for vmbridge-core.

use std::path::PathBuf;

use thiserror::Error;

use crate::classify::StatusCategory;
use crate::pipeline::RebuildStage;

/// Result type for vmbridge-core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Generic text shown to users when the module is missing or unusable.
pub const NOT_READY_MESSAGE: &str = "Error: VM not loaded correctly";

/// Generic text shown to users for failures they did not cause.
pub const INTERNAL_FAILURE_MESSAGE: &str = "Error: VM encountered an internal error";

/// Errors that can occur in vmbridge-core.
#[derive(Debug, Error)]
pub enum Error {
    /// The module file could not be opened.
    #[error("failed to load module {}: {message}", path.display())]
    Load { path: PathBuf, message: String },

    /// The module was opened but a required entry point is missing.
    #[error("module {} is missing symbol `{symbol}`: {message}", path.display())]
    MissingSymbol {
        path: PathBuf,
        symbol: String,
        message: String,
    },

    /// No module is currently loaded.
    #[error("no VM module is loaded")]
    NotReady,

    /// `create_instance` returned a null handle.
    #[error("VM could not create an instance")]
    InstanceCreation,

    /// Preprocessing, parsing or execution of the submitted code failed.
    #[error("{message}")]
    UserCode {
        category: StatusCategory,
        message: String,
    },

    /// The VM reported a status the user is not responsible for.
    #[error("{message}")]
    Internal {
        category: StatusCategory,
        message: String,
    },

    /// A rebuild stage failed.
    #[error("{stage} failed: {reason}")]
    PipelineStage { stage: RebuildStage, reason: String },

    /// A single external command inside a stage failed.
    #[error("`{command}` failed: {message}")]
    Command { command: String, message: String },

    /// The requested language has no type tag.
    #[error("unsupported language: {0}")]
    UnsupportedLanguage(String),

    /// Configuration could not be read or is invalid.
    #[error("config error: {0}")]
    Config(String),

    /// A blocking task panicked or was cancelled by the runtime.
    #[error("worker task failed: {0}")]
    WorkerPanicked(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether the text of this error may be shown to the end user as-is.
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            Self::UserCode { .. }
                | Self::PipelineStage { .. }
                | Self::UnsupportedLanguage(_)
                | Self::Config(_)
        )
    }

    /// Text suitable for the end user.
    ///
    /// Internal failures collapse into a generic line; the full error is
    /// expected to have been logged where it occurred.
    pub fn user_message(&self) -> String {
        match self {
            Self::UserCode { message, .. } => format!("Error: {message}"),
            e if e.is_user_facing() => format!("Error: {e}"),
            Self::NotReady | Self::Load { .. } | Self::MissingSymbol { .. } => {
                NOT_READY_MESSAGE.to_string()
            }
            _ => INTERNAL_FAILURE_MESSAGE.to_string(),
        }
    }
}
