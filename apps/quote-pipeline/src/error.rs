//! Error classification for the quote pipeline.
//!
//! Every failure that is reported rather than propagated (a skipped record, a
//! dropped batch suffix, an instrument that could not be aggregated) is carried
//! as a [`PipelineError`] with an [`ErrorCode`] and key/value context.
//!
//! # Error classes
//!
//! | Class | Handling |
//! |-------|----------|
//! | `Transient` | Retried with backoff at the natural unit (batch or instrument); never bisected |
//! | `DataValidation` | Bisected down to one record, then skipped |
//! | `RetryBudgetExhausted` | Reported; processing continues with other units |
//! | `Configuration` | Fatal at startup |
//! | `Internal` | Reported; indicates a bug or arithmetic overflow |

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error codes for the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Store, sink or transport unavailable or timed out.
    Transient,
    /// A record failed validation.
    DataValidation,
    /// Bisection rounds or transient attempts ran out.
    RetryBudgetExhausted,
    /// Invalid configuration.
    Configuration,
    /// Unexpected failure.
    Internal,
}

impl ErrorCode {
    /// Get the error reason string.
    #[must_use]
    pub const fn reason(&self) -> &'static str {
        match self {
            Self::Transient => "TRANSIENT",
            Self::DataValidation => "DATA_VALIDATION",
            Self::RetryBudgetExhausted => "RETRY_BUDGET_EXHAUSTED",
            Self::Configuration => "CONFIGURATION",
            Self::Internal => "INTERNAL",
        }
    }

    /// Whether the failure may succeed if retried unchanged.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient)
    }

    /// Whether the failure stops the process.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Configuration)
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.reason())
    }
}

/// A reported failure with context.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub struct PipelineError {
    code: ErrorCode,
    message: String,
    context: Vec<(String, String)>,
}

impl PipelineError {
    /// Create a new pipeline error.
    #[must_use]
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            context: Vec::new(),
        }
    }

    /// Add context to the error.
    #[must_use]
    pub fn with_context(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.context.push((key.into(), value.to_string()));
        self
    }

    /// Get the error code.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        self.code
    }

    /// Get the message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Get the context.
    #[must_use]
    pub fn context(&self) -> &[(String, String)] {
        &self.context
    }

    /// Look up a context value.
    #[must_use]
    pub fn context_value(&self, key: &str) -> Option<&str> {
        self.context
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

impl std::fmt::Display for PipelineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code.reason(), self.message)
    }
}

/// Convenience constructors for common errors.
impl PipelineError {
    /// A record failed validation.
    #[must_use]
    pub fn data_validation(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::DataValidation, message)
    }

    /// A dependency was unavailable.
    #[must_use]
    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Transient, message)
    }

    /// A retry budget ran out.
    #[must_use]
    pub fn budget_exhausted(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::RetryBudgetExhausted, message)
    }

    /// Internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Internal, message)
    }
}
