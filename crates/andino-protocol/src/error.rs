//! Protocol-level error types.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Failures of the line codec.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Line exceeds {limit} bytes without a terminator")]
    LineTooLong { limit: usize },

    #[error("Encoding error: {0}")]
    Encoding(#[from] andino_core::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A command argument was absent or did not parse.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ArgError {
    #[error("Missing argument {index}")]
    Missing { index: usize },

    #[error("Invalid argument {index} {value:?}: expected {expected}")]
    Invalid {
        index: usize,
        value: String,
        expected: &'static str,
    },
}

impl ArgError {
    pub fn invalid(index: usize, value: impl Into<String>, expected: &'static str) -> Self {
        Self::Invalid {
            index,
            value: value.into(),
            expected,
        }
    }
}
