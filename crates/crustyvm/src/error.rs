//! Compile-time error type shared by every build pass.

use std::fmt;

/// Error produced while turning source text into a runnable program.
///
/// Carries the pass that failed, the module/line of the offending input when
/// one is known, and a single primary cause. Formatting mirrors the
/// diagnostic prefix convention `stage:module:line: message`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileError {
    stage: &'static str,
    module: Option<String>,
    line: u32,
    message: String,
}

impl CompileError {
    /// Creates an error with no source location.
    #[must_use]
    pub fn new(stage: &'static str, message: impl Into<String>) -> Self {
        Self {
            stage,
            module: None,
            line: 0,
            message: message.into(),
        }
    }

    /// Creates an error attributed to a module and 1-based line.
    #[must_use]
    pub fn at(stage: &'static str, module: impl Into<String>, line: u32, message: impl Into<String>) -> Self {
        Self {
            stage,
            module: Some(module.into()),
            line,
            message: message.into(),
        }
    }

    /// The pass that produced the error.
    #[must_use]
    pub fn stage(&self) -> &'static str {
        self.stage
    }

    /// The module name the error is attributed to, if any.
    #[must_use]
    pub fn module(&self) -> Option<&str> {
        self.module.as_deref()
    }

    /// The 1-based source line, or 0 when unknown.
    #[must_use]
    pub fn line(&self) -> u32 {
        self.line
    }

    /// The primary cause.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.module {
            Some(module) => write!(f, "{}:{}:{}: {}", self.stage, module, self.line, self.message),
            None => write!(f, "{}: {}", self.stage, self.message),
        }
    }
}

impl std::error::Error for CompileError {}

/// Convenience alias used throughout the build passes.
pub type CompileResult<T> = Result<T, CompileError>;
