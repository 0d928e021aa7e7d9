//! Registry error types.

use lens_core::Role;
use lens_laws::LawError;
use thiserror::Error;

/// Errors returned by registry operations.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// No store with this key.
    #[error("store not found: {key}")]
    NotFound {
        /// The missing key.
        key: String,
    },

    /// The store exists but this version is not (or no longer) in history.
    #[error("version {version} of store {key} is not in history")]
    VersionNotFound {
        /// Store key.
        key: String,
        /// Requested version.
        version: u64,
    },

    /// A store with this key already exists.
    #[error("store already registered: {key}")]
    Conflict {
        /// The duplicate key.
        key: String,
    },

    /// The session's role is too low for this operation.
    #[error("forbidden: requires {required} role, session has {actual}")]
    Forbidden {
        /// Role the operation needs.
        required: Role,
        /// Role the session holds.
        actual: Role,
    },

    /// The key is not acceptable.
    #[error("invalid store key: {reason}")]
    InvalidKey {
        /// Why it was rejected.
        reason: String,
    },

    /// Law selection or evaluation failed.
    #[error(transparent)]
    Law(#[from] LawError),
}

/// Result type for registry operations.
pub type Result<T> = std::result::Result<T, RegistryError>;
