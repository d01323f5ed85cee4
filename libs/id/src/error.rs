//! Error types for provider identifier parsing and validation.

use thiserror::Error;

/// Errors that can occur when encoding or parsing provider identifiers.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IdError {
    /// The identifier string is empty.
    #[error("provider ID cannot be empty")]
    Empty,

    /// The identifier does not start with the expected scheme.
    #[error("unexpected provider ID scheme: expected '{expected}', got '{actual}'")]
    InvalidScheme {
        expected: &'static str,
        actual: String,
    },

    /// The identifier has the right scheme but the wrong shape.
    #[error("unexpected provider ID format: {message}")]
    InvalidFormat { message: String },
}

impl IdError {
    /// Returns true if this error indicates the input was empty.
    pub fn is_empty(&self) -> bool {
        matches!(self, IdError::Empty)
    }

    pub(crate) fn format(message: impl Into<String>) -> Self {
        IdError::InvalidFormat {
            message: message.into(),
        }
    }
}
