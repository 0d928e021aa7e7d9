//! System handlers: ping, getInfo.

use async_trait::async_trait;
use lens_core::Role;
use serde_json::{Value, json};
use tracing::instrument;

use crate::rpc::context::{Caller, RpcContext};
use crate::rpc::errors::RpcError;
use crate::rpc::registry::MethodHandler;

/// Returns a pong with the current server timestamp.
pub struct PingHandler;

#[async_trait]
impl MethodHandler for PingHandler {
    fn required_role(&self) -> Option<Role> {
        None
    }

    #[instrument(skip_all, fields(method = "system.ping"))]
    async fn handle(
        &self,
        _params: Option<Value>,
        _ctx: &RpcContext,
        _caller: &Caller,
    ) -> Result<Value, RpcError> {
        Ok(json!({
            "pong": true,
            "timestamp": lens_core::time::now_wire(),
        }))
    }
}

/// Returns server version, uptime, and counters.
pub struct GetInfoHandler;

#[async_trait]
impl MethodHandler for GetInfoHandler {
    #[instrument(skip_all, fields(method = "system.getInfo"))]
    async fn handle(
        &self,
        _params: Option<Value>,
        ctx: &RpcContext,
        _caller: &Caller,
    ) -> Result<Value, RpcError> {
        Ok(json!({
            "version": env!("CARGO_PKG_VERSION"),
            "uptime": ctx.server_start_time.elapsed().as_secs(),
            "activeSessions": ctx.sessions.active_count(),
            "stores": ctx.registry.len(),
            "laws": ctx.laws.catalog().len(),
        }))
    }
}
