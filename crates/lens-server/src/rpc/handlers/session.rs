//! Session handlers: create, renew, revoke, list.

use std::time::Duration;

use async_trait::async_trait;
use lens_auth::Session;
use lens_core::{Role, SessionId};
use serde_json::{Value, json};
use tracing::{info, instrument};

use super::{optional_string_param, optional_u64_param};
use crate::rpc::context::{Caller, RpcContext};
use crate::rpc::errors::RpcError;
use crate::rpc::registry::MethodHandler;

/// Resolve the `sessionId` param: the caller's own session by default,
/// anyone else's only for admins.
fn target_session(params: Option<&Value>, caller: &Caller) -> Result<SessionId, RpcError> {
    let own = caller.require(Role::Viewer)?;
    match optional_string_param(params, "sessionId")? {
        Some(id) if id != own.id.as_str() => {
            let _ = caller.require(Role::Admin)?;
            Ok(SessionId::from(id))
        }
        _ => Ok(own.id.clone()),
    }
}

/// Session lifetime in seconds from `ttl`, or its older spelling `ttlSecs`.
fn ttl_param(params: Option<&Value>) -> Result<Option<Duration>, RpcError> {
    let secs = match optional_u64_param(params, "ttl")? {
        Some(secs) => Some(secs),
        None => optional_u64_param(params, "ttlSecs")?,
    };
    Ok(secs.map(Duration::from_secs))
}

/// Issue a new session and its bearer token.
///
/// Roles above the configured open-enrollment ceiling need an admin caller.
pub struct CreateSessionHandler;

#[async_trait]
impl MethodHandler for CreateSessionHandler {
    fn required_role(&self) -> Option<Role> {
        None
    }

    #[instrument(skip_all, fields(method = "session.create"))]
    async fn handle(
        &self,
        params: Option<Value>,
        ctx: &RpcContext,
        caller: &Caller,
    ) -> Result<Value, RpcError> {
        let params = params.as_ref();
        let role = match optional_string_param(params, "role")? {
            Some(raw) => raw.parse::<Role>().map_err(|e| RpcError::InvalidParams {
                message: e.to_string(),
            })?,
            None => Role::Viewer,
        };
        let label = optional_string_param(params, "label")?.unwrap_or_default();
        let ttl = ttl_param(params)?;

        if role > ctx.settings.auth.open_enrollment_max_role {
            let admin = caller.session().is_some_and(|s| s.role.satisfies(Role::Admin));
            if !admin {
                return Err(RpcError::Forbidden {
                    message: format!("issuing a {role} session requires an admin caller"),
                    details: Some(json!({
                        "required": Role::Admin,
                        "actual": caller.session().map(|s| s.role),
                    })),
                });
            }
        }

        let issued = ctx.sessions.create_session(role, label, ttl);
        info!(session_id = %issued.session.id, %role, "session issued");
        Ok(json!({
            "sessionId": issued.session.id,
            "token": issued.token,
            "role": issued.session.role,
            "label": issued.session.label,
            "expiresAt": lens_core::time::to_wire(issued.session.expires_at),
        }))
    }
}

/// Extend a session's expiry from now.
pub struct RenewSessionHandler;

#[async_trait]
impl MethodHandler for RenewSessionHandler {
    #[instrument(skip_all, fields(method = "session.renew"))]
    async fn handle(
        &self,
        params: Option<Value>,
        ctx: &RpcContext,
        caller: &Caller,
    ) -> Result<Value, RpcError> {
        let target = target_session(params.as_ref(), caller)?;
        let session = ctx.sessions.renew(&target, ttl_param(params.as_ref())?)?;
        Ok(json!({
            "sessionId": session.id,
            "expiresAt": lens_core::time::to_wire(session.expires_at),
        }))
    }
}

/// End a session. Idempotent.
pub struct RevokeSessionHandler;

#[async_trait]
impl MethodHandler for RevokeSessionHandler {
    #[instrument(skip_all, fields(method = "session.revoke"))]
    async fn handle(
        &self,
        params: Option<Value>,
        ctx: &RpcContext,
        caller: &Caller,
    ) -> Result<Value, RpcError> {
        let target = target_session(params.as_ref(), caller)?;
        Ok(json!({ "revoked": ctx.sessions.revoke(&target) }))
    }
}

/// List live sessions, oldest first.
pub struct ListSessionsHandler;

#[async_trait]
impl MethodHandler for ListSessionsHandler {
    fn required_role(&self) -> Option<Role> {
        Some(Role::Admin)
    }

    #[instrument(skip_all, fields(method = "session.list"))]
    async fn handle(
        &self,
        _params: Option<Value>,
        ctx: &RpcContext,
        _caller: &Caller,
    ) -> Result<Value, RpcError> {
        let sessions: Vec<Session> = ctx.sessions.list();
        Ok(json!({ "sessions": sessions }))
    }
}
