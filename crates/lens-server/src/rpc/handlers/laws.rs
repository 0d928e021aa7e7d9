//! Law handlers: evaluate, catalog, suggest, report.

use async_trait::async_trait;
use lens_laws::Violation;
use metrics::counter;
use serde_json::{Value, json};
use tracing::{debug, instrument};

use super::{optional_selection_param, require_param, require_string_param};
use crate::metrics::LAW_EVALUATIONS_TOTAL;
use crate::rpc::context::{Caller, RpcContext};
use crate::rpc::errors::RpcError;
use crate::rpc::registry::MethodHandler;

/// Evaluate a store's current value. `ruleIds` overrides the store's
/// enabled laws.
pub struct EvaluateHandler;

#[async_trait]
impl MethodHandler for EvaluateHandler {
    #[instrument(skip_all, fields(method = "laws.evaluate"))]
    async fn handle(
        &self,
        params: Option<Value>,
        ctx: &RpcContext,
        _caller: &Caller,
    ) -> Result<Value, RpcError> {
        let key = require_string_param(params.as_ref(), "key")?;
        let selection = optional_selection_param(params.as_ref(), "ruleIds")?;
        let (snapshot, evaluation) = ctx.registry.evaluate(&key, selection.as_ref(), &ctx.laws)?;
        counter!(LAW_EVALUATIONS_TOTAL, "source" => "request").increment(1);
        debug!(key, version = snapshot.version, score = evaluation.score, "store evaluated");

        Ok(json!({
            "key": snapshot.key,
            "version": snapshot.version,
            "violations": evaluation.violations,
            "score": evaluation.score,
            "evaluatedLaws": evaluation.evaluated_laws,
        }))
    }
}

/// Every registered law.
pub struct CatalogHandler;

#[async_trait]
impl MethodHandler for CatalogHandler {
    #[instrument(skip_all, fields(method = "laws.catalog"))]
    async fn handle(
        &self,
        _params: Option<Value>,
        ctx: &RpcContext,
        _caller: &Caller,
    ) -> Result<Value, RpcError> {
        Ok(json!({ "laws": ctx.laws.catalog() }))
    }
}

/// Remediation hint for a violation. Nothing is changed.
pub struct SuggestHandler;

#[async_trait]
impl MethodHandler for SuggestHandler {
    #[instrument(skip_all, fields(method = "laws.suggest"))]
    async fn handle(
        &self,
        params: Option<Value>,
        ctx: &RpcContext,
        _caller: &Caller,
    ) -> Result<Value, RpcError> {
        let raw = require_param(params.as_ref(), "violation")?;
        let violation: Violation =
            serde_json::from_value(raw.clone()).map_err(|e| RpcError::InvalidParams {
                message: format!("Parameter 'violation': {e}"),
            })?;
        Ok(json!({ "suggestion": ctx.laws.suggest_auto_fix(&violation) }))
    }
}

/// Latest background compliance report for a store.
pub struct ReportHandler;

#[async_trait]
impl MethodHandler for ReportHandler {
    #[instrument(skip_all, fields(method = "laws.report"))]
    async fn handle(
        &self,
        params: Option<Value>,
        ctx: &RpcContext,
        _caller: &Caller,
    ) -> Result<Value, RpcError> {
        let key = require_string_param(params.as_ref(), "key")?;
        let report = ctx.reports.latest(&key).ok_or_else(|| RpcError::NotFound {
            message: format!("no compliance report for store {key}"),
        })?;
        serde_json::to_value(report).map_err(|e| RpcError::Internal {
            message: e.to_string(),
        })
    }
}
