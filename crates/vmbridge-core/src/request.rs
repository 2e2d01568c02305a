//! Execution requests and results.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::Serialize;

use crate::classify::StatusCategory;
use crate::error::{Error, INTERNAL_FAILURE_MESSAGE};
use crate::native::Invocation;
use crate::render;

/// Single-byte discriminator selecting the VM's interpretation mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeTag(u8);

impl TypeTag {
    /// Direct script source.
    pub const SCRIPT: Self = Self(b's');
    /// Compiled/alternate dialect source.
    pub const COMPILED: Self = Self(b'c');

    pub const fn from_byte(byte: u8) -> Self {
        Self(byte)
    }

    pub const fn as_byte(self) -> u8 {
        self.0
    }

    /// Language name used for the code fence of rendered output.
    pub fn fence_language(self) -> &'static str {
        match self {
            Self::SCRIPT => "sqf",
            Self::COMPILED => "sqc",
            _ => "",
        }
    }
}

impl FromStr for TypeTag {
    type Err = Error;

    fn from_str(language: &str) -> Result<Self, Self::Err> {
        match language.to_ascii_lowercase().as_str() {
            "sqf" | "script" => Ok(Self::SCRIPT),
            "sqc" | "compiled" => Ok(Self::COMPILED),
            // Raw tags are passed through; the VM rejects unknown ones itself.
            raw if raw.len() == 1 && language.is_ascii() => Ok(Self(language.as_bytes()[0])),
            _ => Err(Error::UnsupportedLanguage(language.to_string())),
        }
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0 as char)
    }
}

/// A request to execute source code. Immutable once built.
#[derive(Debug, Clone)]
pub struct ExecutionRequest {
    tag: TypeTag,
    source: String,
    timeout: Duration,
}

impl ExecutionRequest {
    pub fn new(tag: TypeTag, source: impl Into<String>, timeout: Duration) -> Self {
        Self {
            tag,
            source: source.into(),
            timeout,
        }
    }

    /// Build a request from a language name such as `sqf`.
    pub fn for_language(language: &str, source: impl Into<String>, timeout: Duration) -> crate::Result<Self> {
        Ok(Self::new(language.parse()?, source, timeout))
    }

    pub fn tag(&self) -> TypeTag {
        self.tag
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

/// Outcome of one execution, classified and rendered.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionResult {
    /// Captured output lines, in callback order.
    pub lines: Vec<String>,
    /// Raw VM status code.
    pub status: i32,
    pub category: StatusCategory,
    /// User-visible text, fenced and capped at the transport budget.
    pub rendered: String,
}

impl ExecutionResult {
    /// Classify and render a raw invocation.
    pub fn from_invocation(invocation: Invocation, tag: TypeTag, budget: usize) -> Self {
        let category = StatusCategory::from(invocation.status);
        let mut result = Self {
            lines: invocation.lines,
            status: invocation.status,
            category,
            rendered: String::new(),
        };
        result.rendered = render::code_block(&result.display_text(), tag.fence_language(), budget);
        result
    }

    /// Captured output joined by newlines.
    pub fn text(&self) -> String {
        self.lines.join("\n")
    }

    pub fn is_success(&self) -> bool {
        self.category.is_success()
    }

    /// Error matching the status, if it was not a success.
    pub fn error(&self) -> Option<Error> {
        self.category.to_error()
    }

    /// Output as shown to the user, including an error line on failure.
    ///
    /// User-caused failures show the classifier message; internal failures
    /// show only a generic line.
    pub fn display_text(&self) -> String {
        let text = self.text();
        match self.error() {
            None => text,
            Some(err @ Error::UserCode { .. }) => format!("{text}\n{}", err.user_message()),
            Some(_) => format!("{text}\n{INTERNAL_FAILURE_MESSAGE}"),
        }
    }
}
