//! RPC error codes and error type.

use axum::http::StatusCode;
use lens_auth::AuthError;
use lens_laws::LawError;
use lens_registry::RegistryError;
use serde_json::json;

use super::types::RpcErrorBody;

// ── Error code constants ────────────────────────────────────────────

/// Missing, unknown, or expired token.
pub const UNAUTHORIZED: &str = "UNAUTHORIZED";
/// Valid token, insufficient role.
pub const FORBIDDEN: &str = "FORBIDDEN";
/// Store, version, or session not found.
pub const NOT_FOUND: &str = "NOT_FOUND";
/// Store key already registered.
pub const CONFLICT: &str = "CONFLICT";
/// Invalid or missing parameters.
pub const INVALID_PARAMS: &str = "INVALID_PARAMS";
/// Method not found in the registry.
pub const METHOD_NOT_FOUND: &str = "METHOD_NOT_FOUND";
/// Unexpected internal error.
pub const INTERNAL_ERROR: &str = "INTERNAL_ERROR";

/// HTTP status used by `POST /rpc` for an error code.
pub fn http_status(code: &str) -> StatusCode {
    match code {
        UNAUTHORIZED => StatusCode::UNAUTHORIZED,
        FORBIDDEN => StatusCode::FORBIDDEN,
        NOT_FOUND | METHOD_NOT_FOUND => StatusCode::NOT_FOUND,
        CONFLICT => StatusCode::CONFLICT,
        INVALID_PARAMS => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// RPC error type returned by handlers.
#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    /// Required parameter missing or wrong type.
    #[error("{message}")]
    InvalidParams {
        /// Description of what is wrong.
        message: String,
    },

    /// No valid session behind the request.
    #[error("{message}")]
    Unauthorized {
        /// Description.
        message: String,
    },

    /// The session's role is too low.
    #[error("{message}")]
    Forbidden {
        /// Description.
        message: String,
        /// Required and actual roles.
        details: Option<serde_json::Value>,
    },

    /// Requested resource not found.
    #[error("{message}")]
    NotFound {
        /// Human-readable message.
        message: String,
    },

    /// Resource already exists.
    #[error("{message}")]
    Conflict {
        /// Description.
        message: String,
    },

    /// Internal server error.
    #[error("{message}")]
    Internal {
        /// Description.
        message: String,
    },
}

impl RpcError {
    /// Machine-readable error code for this variant.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidParams { .. } => INVALID_PARAMS,
            Self::Unauthorized { .. } => UNAUTHORIZED,
            Self::Forbidden { .. } => FORBIDDEN,
            Self::NotFound { .. } => NOT_FOUND,
            Self::Conflict { .. } => CONFLICT,
            Self::Internal { .. } => INTERNAL_ERROR,
        }
    }

    /// Convert to the wire-format error body.
    pub fn to_error_body(&self) -> RpcErrorBody {
        RpcErrorBody {
            code: self.code().to_owned(),
            message: self.to_string(),
            details: match self {
                Self::Forbidden { details, .. } => details.clone(),
                _ => None,
            },
        }
    }

    fn forbidden(required: lens_core::Role, actual: lens_core::Role) -> Self {
        Self::Forbidden {
            message: format!("requires {required} role, session has {actual}"),
            details: Some(json!({ "required": required, "actual": actual })),
        }
    }
}

impl From<AuthError> for RpcError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Unauthorized => Self::Unauthorized {
                message: err.to_string(),
            },
            AuthError::Forbidden { required, actual } => Self::forbidden(required, actual),
            AuthError::SessionNotFound(_) => Self::NotFound {
                message: err.to_string(),
            },
        }
    }
}

impl From<RegistryError> for RpcError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::NotFound { .. } | RegistryError::VersionNotFound { .. } => {
                Self::NotFound {
                    message: err.to_string(),
                }
            }
            RegistryError::Conflict { .. } => Self::Conflict {
                message: err.to_string(),
            },
            RegistryError::Forbidden { required, actual } => Self::forbidden(required, actual),
            RegistryError::InvalidKey { .. } => Self::InvalidParams {
                message: err.to_string(),
            },
            RegistryError::Law(law) => law.into(),
        }
    }
}

impl From<LawError> for RpcError {
    fn from(err: LawError) -> Self {
        match err {
            LawError::UnknownLaw { .. }
            | LawError::InvalidLaw { .. }
            | LawError::Regex(_) => Self::InvalidParams {
                message: err.to_string(),
            },
            LawError::DuplicateLaw { .. } => Self::Conflict {
                message: err.to_string(),
            },
            LawError::Check { .. } => Self::Internal {
                message: err.to_string(),
            },
        }
    }
}
