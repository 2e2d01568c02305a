//! Status code classification.
//!
//! Maps the signed status returned by the VM's `call` entry point to a
//! category and a human readable message.

use serde::Serialize;

use crate::error::Error;

const INTERNAL_PREFIX: &str = "VM encountered an internal error";
const USER_PREFIX: &str = "VM encountered an error while executing the code";

/// Category of a VM status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StatusCategory {
    /// The call succeeded
    Success,
    /// The instance was null
    InstanceNull,
    /// Preprocessing failed
    PreprocessingFailed,
    /// Parsing failed
    ParsingFailed,
    /// The instance is already running
    AlreadyRunning,
    /// The provided type tag was invalid
    InvalidType,
    /// The execution did not succeed
    ExecutionFailed,
    /// Any code outside the documented table
    Unknown(i32),
}

impl From<i32> for StatusCategory {
    fn from(code: i32) -> Self {
        match code {
            0 => Self::Success,
            -1 => Self::InstanceNull,
            -2 => Self::PreprocessingFailed,
            -3 => Self::ParsingFailed,
            -4 => Self::AlreadyRunning,
            -5 => Self::InvalidType,
            -6 => Self::ExecutionFailed,
            other => Self::Unknown(other),
        }
    }
}

impl StatusCategory {
    /// The raw status code for this category.
    pub fn code(self) -> i32 {
        match self {
            Self::Success => 0,
            Self::InstanceNull => -1,
            Self::PreprocessingFailed => -2,
            Self::ParsingFailed => -3,
            Self::AlreadyRunning => -4,
            Self::InvalidType => -5,
            Self::ExecutionFailed => -6,
            Self::Unknown(code) => code,
        }
    }

    pub fn is_success(self) -> bool {
        self == Self::Success
    }

    /// Whether the submitted code, rather than the VM, caused the failure.
    pub fn is_user_caused(self) -> bool {
        matches!(
            self,
            Self::PreprocessingFailed | Self::ParsingFailed | Self::ExecutionFailed
        )
    }

    fn detail(self) -> &'static str {
        match self {
            Self::Success => "calling the VM instance was successful",
            Self::InstanceNull => "the instance was null",
            Self::PreprocessingFailed => "preprocessing failed",
            Self::ParsingFailed => "parsing failed",
            Self::AlreadyRunning => "the instance is already running",
            Self::InvalidType => "the provided type was invalid",
            Self::ExecutionFailed => "the execution did not succeed",
            Self::Unknown(_) => "unknown status",
        }
    }

    /// Message describing this category.
    pub fn message(self) -> String {
        match self {
            Self::Unknown(code) => format!("Unknown error! Error code: {code}"),
            c if c.is_user_caused() => format!("{USER_PREFIX}: {}", c.detail()),
            c => format!("{INTERNAL_PREFIX}: {}", c.detail()),
        }
    }

    /// Convert a failing category into the matching error.
    ///
    /// Returns `None` for `Success`.
    pub fn to_error(self) -> Option<Error> {
        if self.is_success() {
            return None;
        }
        let message = self.message();
        Some(if self.is_user_caused() {
            Error::UserCode {
                category: self,
                message,
            }
        } else {
            Error::Internal {
                category: self,
                message,
            }
        })
    }
}

/// Classify a raw status code.
pub fn classify(code: i32) -> (StatusCategory, String) {
    let category = StatusCategory::from(code);
    (category, category.message())
}
