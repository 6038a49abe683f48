//! Shared error types for the toolkit

use thiserror::Error;

/// Main error type for liftmap operations
#[derive(Debug, Error)]
pub enum Error {
    /// Pattern text failed to parse
    #[error("pattern parse error at offset {position}: {message}")]
    PatternParse { position: usize, message: String },

    /// Configuration errors
    #[error("configuration error: {0}")]
    Configuration(String),

    /// IO errors
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a pattern parse error with source offset
    pub fn pattern_parse(position: usize, message: impl Into<String>) -> Self {
        Self::PatternParse {
            position,
            message: message.into(),
        }
    }
}

/// Result type alias using our error type
pub type Result<T> = std::result::Result<T, Error>;
