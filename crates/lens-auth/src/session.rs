//! Session records and lifecycle events.

use std::fmt;

use chrono::{DateTime, Utc};
use lens_core::{Role, SessionId};
use serde::Serialize;

use crate::errors::{AuthError, Result};

/// An authenticated, role-scoped, time-bounded actor identity.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// Session identifier (not the bearer token).
    pub id: SessionId,
    /// Privilege level.
    pub role: Role,
    /// Free-form label supplied at creation.
    pub label: String,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// The session is valid strictly before this instant.
    pub expires_at: DateTime<Utc>,
}

impl Session {
    /// Whether the session is still valid at `now`.
    #[must_use]
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }

    /// Fail with [`AuthError::Forbidden`] unless this session's role is at
    /// least `required`.
    pub fn require(&self, required: Role) -> Result<()> {
        if self.role.satisfies(required) {
            Ok(())
        } else {
            Err(AuthError::Forbidden {
                required,
                actual: self.role,
            })
        }
    }
}

/// Result of [`create_session`](crate::SessionManager::create_session).
///
/// The token is only ever available here; the manager keeps its digest.
#[derive(Clone)]
pub struct IssuedSession {
    /// The new session.
    pub session: Session,
    /// Opaque bearer token.
    pub token: String,
}

impl fmt::Debug for IssuedSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IssuedSession")
            .field("session", &self.session)
            .field("token", &"<redacted>")
            .finish()
    }
}

/// Lifecycle notifications emitted by the session manager.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionLifecycle {
    /// A session was issued.
    Created {
        /// Session id.
        session_id: SessionId,
        /// Granted role.
        role: Role,
    },
    /// A session's expiry was extended.
    Renewed {
        /// Session id.
        session_id: SessionId,
        /// New expiry.
        expires_at: DateTime<Utc>,
    },
    /// A session was explicitly revoked.
    Revoked {
        /// Session id.
        session_id: SessionId,
    },
    /// A session reached its expiry and was purged.
    Expired {
        /// Session id.
        session_id: SessionId,
    },
}

impl SessionLifecycle {
    /// The session this event concerns.
    #[must_use]
    pub fn session_id(&self) -> &SessionId {
        match self {
            Self::Created { session_id, .. }
            | Self::Renewed { session_id, .. }
            | Self::Revoked { session_id }
            | Self::Expired { session_id } => session_id,
        }
    }

    /// Whether the session no longer exists after this event.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Revoked { .. } | Self::Expired { .. })
    }
}
