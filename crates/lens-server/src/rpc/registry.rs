//! Method registry and async dispatch.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use lens_core::Role;
use metrics::{counter, histogram};
use serde_json::Value;
use tracing::warn;

use super::context::{Caller, RpcContext};
use super::errors::{self, RpcError};
use super::types::{RpcRequest, RpcResponse};
use crate::metrics::{RPC_ERRORS_TOTAL, RPC_REQUEST_DURATION_SECONDS, RPC_REQUESTS_TOTAL};

/// Trait implemented by every RPC method handler.
#[async_trait]
pub trait MethodHandler: Send + Sync {
    /// Minimum role a caller needs; `None` admits callers without a token.
    fn required_role(&self) -> Option<Role> {
        Some(Role::Viewer)
    }

    /// Execute the handler with the given params, context, and caller.
    async fn handle(
        &self,
        params: Option<Value>,
        ctx: &RpcContext,
        caller: &Caller,
    ) -> Result<Value, RpcError>;
}

/// Registry mapping method names to handlers.
pub struct MethodRegistry {
    handlers: HashMap<String, Arc<dyn MethodHandler>>,
}

impl MethodRegistry {
    /// Maximum time a single RPC handler is allowed to run.
    const HANDLER_TIMEOUT: Duration = Duration::from_secs(30);

    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Register a handler for a method name.
    pub fn register(&mut self, method: &str, handler: impl MethodHandler + 'static) {
        let _ = self.handlers.insert(method.to_owned(), Arc::new(handler));
    }

    /// Dispatch a request to the appropriate handler.
    ///
    /// `token` is validated on every call. A token that fails validation is
    /// rejected even for methods that admit anonymous callers.
    pub async fn dispatch(
        &self,
        request: RpcRequest,
        token: Option<&str>,
        ctx: &RpcContext,
    ) -> RpcResponse {
        let method = request.method.clone();
        counter!(RPC_REQUESTS_TOTAL, "method" => method.clone()).increment(1);

        let Some(handler) = self.handlers.get(&method) else {
            counter!(RPC_ERRORS_TOTAL, "method" => method.clone(), "error_type" => errors::METHOD_NOT_FOUND).increment(1);
            return RpcResponse::error(
                &request.id,
                errors::METHOD_NOT_FOUND,
                format!("Method '{method}' not found"),
            );
        };

        let start = Instant::now();
        let result = match resolve_caller(handler.as_ref(), token, ctx) {
            Ok(caller) => tokio::time::timeout(
                Self::HANDLER_TIMEOUT,
                handler.handle(request.params, ctx, &caller),
            )
            .await
            .ok(),
            Err(err) => Some(Err(err)),
        };

        let response = match result {
            Some(Ok(result)) => RpcResponse::success(&request.id, result),
            Some(Err(err)) => {
                counter!(RPC_ERRORS_TOTAL, "method" => method.clone(), "error_type" => err.code()).increment(1);
                RpcResponse {
                    id: request.id,
                    success: false,
                    result: None,
                    error: Some(err.to_error_body()),
                }
            }
            None => {
                counter!(RPC_ERRORS_TOTAL, "method" => method.clone(), "error_type" => "timeout").increment(1);
                tracing::error!(method, "RPC handler timed out after {:?}", Self::HANDLER_TIMEOUT);
                RpcResponse::error(
                    &request.id,
                    errors::INTERNAL_ERROR,
                    format!("Handler for '{method}' timed out"),
                )
            }
        };

        let duration = start.elapsed();
        histogram!(RPC_REQUEST_DURATION_SECONDS, "method" => method.clone())
            .record(duration.as_secs_f64());
        if duration.as_secs() >= 2 {
            warn!(
                method,
                duration_secs = duration.as_secs_f64(),
                "slow RPC request"
            );
        }

        response
    }

    /// List all registered method names (sorted).
    pub fn methods(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.keys().cloned().collect();
        names.sort();
        names
    }

    /// Check whether a method is registered.
    pub fn has_method(&self, method: &str) -> bool {
        self.handlers.contains_key(method)
    }
}

impl Default for MethodRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn resolve_caller(
    handler: &dyn MethodHandler,
    token: Option<&str>,
    ctx: &RpcContext,
) -> Result<Caller, RpcError> {
    let caller = match token {
        Some(token) => Caller::authenticated(ctx.sessions.validate_token(token)?),
        None => Caller::anonymous(),
    };
    if let Some(role) = handler.required_role() {
        let _ = caller.require(role)?;
    }
    Ok(caller)
}
