//! Auth error types.

use lens_core::{Role, SessionId};

/// Errors returned by session validation and authorization.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    /// Token missing, unknown, or expired.
    #[error("unauthorized: missing, invalid, or expired token")]
    Unauthorized,

    /// Token valid but the session's role is too low.
    #[error("forbidden: requires {required} role, session has {actual}")]
    Forbidden {
        /// Role the operation needs.
        required: Role,
        /// Role the session holds.
        actual: Role,
    },

    /// No live session with this id.
    #[error("session not found: {0}")]
    SessionNotFound(SessionId),
}

/// Result type for auth operations.
pub type Result<T> = std::result::Result<T, AuthError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forbidden_display_names_both_roles() {
        let err = AuthError::Forbidden {
            required: Role::Editor,
            actual: Role::Viewer,
        };
        assert_eq!(
            err.to_string(),
            "forbidden: requires editor role, session has viewer"
        );
    }

    #[test]
    fn not_found_display() {
        let err = AuthError::SessionNotFound(SessionId::from("sess_x"));
        assert_eq!(err.to_string(), "session not found: sess_x");
    }
}
