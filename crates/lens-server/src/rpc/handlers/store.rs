//! Store handlers: register, change, get, list, remove, history, revert,
//! setLaws, orphans.

use std::time::Duration;

use async_trait::async_trait;
use lens_core::Role;
use lens_laws::LawSelection;
use lens_registry::RegisterMode;
use serde_json::{Value, json};
use tracing::instrument;

use super::{
    optional_selection_param, optional_u64_param, require_param, require_string_param,
    require_u64_param,
};
use crate::rpc::context::{Caller, RpcContext};
use crate::rpc::errors::RpcError;
use crate::rpc::registry::MethodHandler;

fn to_value<T: serde::Serialize>(value: &T) -> Result<Value, RpcError> {
    serde_json::to_value(value).map_err(|e| RpcError::Internal {
        message: e.to_string(),
    })
}

/// Register a store at version 0 holding `initialValue` (`value` is accepted
/// as an alias). `replace: true` resets an existing key.
pub struct RegisterStoreHandler;

#[async_trait]
impl MethodHandler for RegisterStoreHandler {
    fn required_role(&self) -> Option<Role> {
        Some(Role::Editor)
    }

    #[instrument(skip_all, fields(method = "store.register"))]
    async fn handle(
        &self,
        params: Option<Value>,
        ctx: &RpcContext,
        caller: &Caller,
    ) -> Result<Value, RpcError> {
        let session = caller.require(Role::Editor)?;
        let key = require_string_param(params.as_ref(), "key")?;
        let value = params
            .as_ref()
            .and_then(|p| p.get("initialValue").or_else(|| p.get("value")))
            .cloned()
            .ok_or_else(|| RpcError::InvalidParams {
                message: "Missing required parameter 'initialValue'".into(),
            })?;
        let mode = match params.as_ref().and_then(|p| p.get("replace")) {
            None | Some(Value::Null | Value::Bool(false)) => RegisterMode::CreateOnly,
            Some(Value::Bool(true)) => RegisterMode::Replace,
            Some(_) => {
                return Err(RpcError::InvalidParams {
                    message: "Parameter 'replace' must be a boolean".into(),
                });
            }
        };

        let snapshot = ctx.registry.register(&key, value, session, mode)?;
        Ok(json!({ "key": snapshot.key, "version": snapshot.version }))
    }
}

/// Commit a new value to an existing store.
pub struct ChangeStoreHandler;

#[async_trait]
impl MethodHandler for ChangeStoreHandler {
    fn required_role(&self) -> Option<Role> {
        Some(Role::Editor)
    }

    #[instrument(skip_all, fields(method = "store.change"))]
    async fn handle(
        &self,
        params: Option<Value>,
        ctx: &RpcContext,
        caller: &Caller,
    ) -> Result<Value, RpcError> {
        let session = caller.require(Role::Editor)?;
        let key = require_string_param(params.as_ref(), "key")?;
        let value = require_param(params.as_ref(), "value")?.clone();
        let receipt = ctx.registry.apply_change(&key, value, session)?;
        to_value(&receipt)
    }
}

/// Current snapshot of a store.
pub struct GetStoreHandler;

#[async_trait]
impl MethodHandler for GetStoreHandler {
    #[instrument(skip_all, fields(method = "store.get"))]
    async fn handle(
        &self,
        params: Option<Value>,
        ctx: &RpcContext,
        _caller: &Caller,
    ) -> Result<Value, RpcError> {
        let key = require_string_param(params.as_ref(), "key")?;
        to_value(&ctx.registry.get(&key)?)
    }
}

/// Registered keys in registration order.
pub struct ListStoresHandler;

#[async_trait]
impl MethodHandler for ListStoresHandler {
    #[instrument(skip_all, fields(method = "store.list"))]
    async fn handle(
        &self,
        _params: Option<Value>,
        ctx: &RpcContext,
        _caller: &Caller,
    ) -> Result<Value, RpcError> {
        Ok(json!({ "keys": ctx.registry.list_keys() }))
    }
}

/// Deregister a store.
pub struct RemoveStoreHandler;

#[async_trait]
impl MethodHandler for RemoveStoreHandler {
    fn required_role(&self) -> Option<Role> {
        Some(Role::Editor)
    }

    #[instrument(skip_all, fields(method = "store.remove"))]
    async fn handle(
        &self,
        params: Option<Value>,
        ctx: &RpcContext,
        caller: &Caller,
    ) -> Result<Value, RpcError> {
        let session = caller.require(Role::Editor)?;
        let key = require_string_param(params.as_ref(), "key")?;
        ctx.registry.deregister(&key, session)?;
        Ok(json!({ "key": key, "removed": true }))
    }
}

/// Retained history, oldest first, or a single version when `version` is
/// given.
pub struct HistoryHandler;

#[async_trait]
impl MethodHandler for HistoryHandler {
    #[instrument(skip_all, fields(method = "store.history"))]
    async fn handle(
        &self,
        params: Option<Value>,
        ctx: &RpcContext,
        _caller: &Caller,
    ) -> Result<Value, RpcError> {
        let key = require_string_param(params.as_ref(), "key")?;
        let entries = match optional_u64_param(params.as_ref(), "version")? {
            Some(version) => vec![ctx.registry.entry_at(&key, version)?],
            None => ctx.registry.history(&key)?,
        };
        Ok(json!({ "key": key, "entries": to_value(&entries)? }))
    }
}

/// Commit a historical value as a new version.
pub struct RevertHandler;

#[async_trait]
impl MethodHandler for RevertHandler {
    fn required_role(&self) -> Option<Role> {
        Some(Role::Editor)
    }

    #[instrument(skip_all, fields(method = "store.revert"))]
    async fn handle(
        &self,
        params: Option<Value>,
        ctx: &RpcContext,
        caller: &Caller,
    ) -> Result<Value, RpcError> {
        let session = caller.require(Role::Editor)?;
        let key = require_string_param(params.as_ref(), "key")?;
        let version = require_u64_param(params.as_ref(), "version")?;
        to_value(&ctx.registry.revert_to(&key, version, session)?)
    }
}

/// Replace the laws a store is evaluated against by default.
pub struct SetLawsHandler;

#[async_trait]
impl MethodHandler for SetLawsHandler {
    fn required_role(&self) -> Option<Role> {
        Some(Role::Editor)
    }

    #[instrument(skip_all, fields(method = "store.setLaws"))]
    async fn handle(
        &self,
        params: Option<Value>,
        ctx: &RpcContext,
        caller: &Caller,
    ) -> Result<Value, RpcError> {
        let session = caller.require(Role::Editor)?;
        let key = require_string_param(params.as_ref(), "key")?;
        let selection: LawSelection = optional_selection_param(params.as_ref(), "laws")?
            .ok_or_else(|| RpcError::InvalidParams {
                message: "Missing required parameter: laws".into(),
            })?;
        let _ = ctx.laws.resolve(&selection)?;
        let stored = ctx.registry.set_enabled_laws(&key, selection, session)?;
        Ok(json!({ "key": key, "laws": stored }))
    }
}

/// Stores never written past version 0.
pub struct OrphansHandler;

#[async_trait]
impl MethodHandler for OrphansHandler {
    #[instrument(skip_all, fields(method = "store.orphans"))]
    async fn handle(
        &self,
        params: Option<Value>,
        ctx: &RpcContext,
        _caller: &Caller,
    ) -> Result<Value, RpcError> {
        let min_age = optional_u64_param(params.as_ref(), "minAgeSecs")?
            .unwrap_or(ctx.settings.registry.orphan_after_secs);
        Ok(json!({ "keys": ctx.registry.orphans(Duration::from_secs(min_age)) }))
    }
}
