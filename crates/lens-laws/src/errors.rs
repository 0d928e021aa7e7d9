//! Error types for the law engine.

use thiserror::Error;

/// Errors raised by law registration, selection, or a law's own check.
#[derive(Debug, Error)]
pub enum LawError {
    /// A selection named a law that is not in the catalog.
    #[error("unknown law: {law_id}")]
    UnknownLaw {
        /// The ID that did not resolve.
        law_id: String,
    },

    /// A law with this ID is already registered.
    #[error("law already registered: {law_id}")]
    DuplicateLaw {
        /// The conflicting ID.
        law_id: String,
    },

    /// Invalid law configuration.
    #[error("invalid law configuration: {message}")]
    InvalidLaw {
        /// Description of the configuration error.
        message: String,
    },

    /// A law could not complete its check.
    #[error("law check failed: {message}")]
    Check {
        /// What went wrong.
        message: String,
    },

    /// Regex compilation error.
    #[error("regex compilation error: {0}")]
    Regex(#[from] regex::Error),
}

/// Result type for law operations.
pub type Result<T> = std::result::Result<T, LawError>;
