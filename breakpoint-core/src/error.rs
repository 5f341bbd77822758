//! Error types for breakpoint interception

use thiserror::Error;

/// Main error type for breakpoint operations
///
/// None of these ever cross the public `intercept` boundary. They are logged
/// and the coordinator degrades to forwarding the message.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BreakpointError {
    #[error("Invalid pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("Breakpoint '{breakpoint}' failed to evaluate: {reason}")]
    Evaluation { breakpoint: String, reason: String },

    #[error("UI context unavailable: {reason}")]
    UiUnavailable { reason: String },

    #[error("UI job cancelled before completion")]
    UiCancelled,

    #[error("UI job panicked: {details}")]
    UiPanicked { details: String },

    #[error("Configuration error: {component} - {reason}")]
    Configuration { component: String, reason: String },

    #[error("Failed to read message body: {details}")]
    BodyRead { details: String },
}

impl BreakpointError {
    /// Create an invalid pattern error
    pub fn invalid_pattern(pattern: &str, reason: impl ToString) -> Self {
        Self::InvalidPattern {
            pattern: pattern.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Create a predicate evaluation error
    pub fn evaluation(breakpoint: &str, reason: impl ToString) -> Self {
        Self::Evaluation {
            breakpoint: breakpoint.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Create a configuration error
    pub fn configuration(component: &str, reason: impl ToString) -> Self {
        Self::Configuration {
            component: component.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Whether the coordinator recovers from this error by letting the message through.
    pub fn is_fail_open(&self) -> bool {
        match self {
            BreakpointError::Evaluation { .. }
            | BreakpointError::UiUnavailable { .. }
            | BreakpointError::UiCancelled
            | BreakpointError::UiPanicked { .. }
            | BreakpointError::BodyRead { .. } => true,

            // Rejected up front when the registry is built
            BreakpointError::InvalidPattern { .. } | BreakpointError::Configuration { .. } => false,
        }
    }
}

/// Render a caught panic payload for logging
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
