//! Shared state handed to every RPC handler, and the resolved caller.

use std::sync::Arc;
use std::time::Instant;

use lens_auth::{Session, SessionConfig, SessionManager};
use lens_core::Role;
use lens_laws::{LawEngine, LawError};
use lens_registry::{RegistryConfig, StoreRegistry};
use lens_settings::LensSettings;

use super::errors::RpcError;
use crate::compliance::ReportBook;

/// Shared context passed to every RPC handler.
pub struct RpcContext {
    /// Session issuance and validation.
    pub sessions: Arc<SessionManager>,
    /// Live stores.
    pub registry: Arc<StoreRegistry>,
    /// Law catalog and evaluator.
    pub laws: Arc<LawEngine>,
    /// Latest compliance report per store.
    pub reports: Arc<ReportBook>,
    /// Effective settings.
    pub settings: Arc<LensSettings>,
    /// When the server started (for uptime calculation).
    pub server_start_time: Instant,
}

impl RpcContext {
    /// Build every component from settings.
    ///
    /// Fails only if a configured custom law is invalid.
    pub fn from_settings(settings: LensSettings) -> Result<Self, LawError> {
        let laws = LawEngine::from_settings(&settings.laws)?;
        Ok(Self {
            sessions: Arc::new(SessionManager::new(SessionConfig::from(&settings.auth))),
            registry: Arc::new(StoreRegistry::new(RegistryConfig::from(&settings))),
            laws: Arc::new(laws),
            reports: Arc::new(ReportBook::new()),
            settings: Arc::new(settings),
            server_start_time: Instant::now(),
        })
    }
}

/// Who is making a request.
///
/// A presented token that fails validation never reaches a handler, so an
/// anonymous caller is one that presented no token at all.
#[derive(Clone, Debug, Default)]
pub struct Caller {
    session: Option<Session>,
}

impl Caller {
    /// A caller without a token.
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// A caller with a validated session.
    pub fn authenticated(session: Session) -> Self {
        Self {
            session: Some(session),
        }
    }

    /// The caller's session, if any.
    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    /// The caller's session, which must hold at least `role`.
    pub fn require(&self, role: Role) -> Result<&Session, RpcError> {
        let session = self.session.as_ref().ok_or_else(|| RpcError::Unauthorized {
            message: "a bearer token is required".into(),
        })?;
        session.require(role)?;
        Ok(session)
    }
}
