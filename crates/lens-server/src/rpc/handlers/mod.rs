//! RPC handler modules and registration.

pub mod laws;
pub mod session;
pub mod store;
pub mod system;

use lens_laws::LawSelection;
use serde_json::Value;

use super::errors::RpcError;
use super::registry::MethodRegistry;

/// Register all RPC handlers with the registry.
pub fn register_all(registry: &mut MethodRegistry) {
    // System
    registry.register("system.ping", system::PingHandler);
    registry.register("system.getInfo", system::GetInfoHandler);

    // Session
    registry.register("session.create", session::CreateSessionHandler);
    registry.register("session.renew", session::RenewSessionHandler);
    registry.register("session.revoke", session::RevokeSessionHandler);
    registry.register("session.list", session::ListSessionsHandler);

    // Store
    registry.register("store.register", store::RegisterStoreHandler);
    registry.register("store.change", store::ChangeStoreHandler);
    registry.register("store.get", store::GetStoreHandler);
    registry.register("store.list", store::ListStoresHandler);
    registry.register("store.remove", store::RemoveStoreHandler);
    registry.register("store.history", store::HistoryHandler);
    registry.register("store.revert", store::RevertHandler);
    registry.register("store.setLaws", store::SetLawsHandler);
    registry.register("store.orphans", store::OrphansHandler);

    // Laws
    registry.register("laws.evaluate", laws::EvaluateHandler);
    registry.register("laws.catalog", laws::CatalogHandler);
    registry.register("laws.suggest", laws::SuggestHandler);
    registry.register("laws.report", laws::ReportHandler);
}

/// Extract a required parameter from the params object.
pub(crate) fn require_param<'a>(
    params: Option<&'a Value>,
    key: &str,
) -> Result<&'a Value, RpcError> {
    params
        .and_then(|p| p.get(key))
        .ok_or_else(|| RpcError::InvalidParams {
            message: format!("Missing required parameter: {key}"),
        })
}

/// Extract a required string parameter.
pub(crate) fn require_string_param(params: Option<&Value>, key: &str) -> Result<String, RpcError> {
    require_param(params, key)?
        .as_str()
        .map(ToOwned::to_owned)
        .ok_or_else(|| RpcError::InvalidParams {
            message: format!("Parameter '{key}' must be a string"),
        })
}

/// Extract a required non-negative integer parameter.
pub(crate) fn require_u64_param(params: Option<&Value>, key: &str) -> Result<u64, RpcError> {
    require_param(params, key)?
        .as_u64()
        .ok_or_else(|| RpcError::InvalidParams {
            message: format!("Parameter '{key}' must be a non-negative integer"),
        })
}

/// Extract an optional string parameter; present but not a string is an error.
pub(crate) fn optional_string_param(
    params: Option<&Value>,
    key: &str,
) -> Result<Option<String>, RpcError> {
    match params.and_then(|p| p.get(key)) {
        None | Some(Value::Null) => Ok(None),
        Some(_) => require_string_param(params, key).map(Some),
    }
}

/// Extract an optional non-negative integer parameter.
pub(crate) fn optional_u64_param(params: Option<&Value>, key: &str) -> Result<Option<u64>, RpcError> {
    match params.and_then(|p| p.get(key)) {
        None | Some(Value::Null) => Ok(None),
        Some(_) => require_u64_param(params, key).map(Some),
    }
}

/// Extract an optional law selection: `"all"` or a list of law ids.
pub(crate) fn optional_selection_param(
    params: Option<&Value>,
    key: &str,
) -> Result<Option<LawSelection>, RpcError> {
    match params.and_then(|p| p.get(key)) {
        None | Some(Value::Null) => Ok(None),
        Some(raw) => serde_json::from_value(raw.clone())
            .map(Some)
            .map_err(|e| RpcError::InvalidParams {
                message: format!("Parameter '{key}': {e}"),
            }),
    }
}
