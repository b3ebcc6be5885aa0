//! Request handler and method dispatcher.

use crate::error::{ProtocolError, ProtocolResult};
use crate::protocol::types::*;
use async_trait::async_trait;
use futures::FutureExt;
use serde_json::Value;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, error, instrument, warn};

/// Handler trait for processing capability requests.
#[async_trait]
pub trait Handler: Send + Sync {
    /// Every registered capability, tools first, then resources, then prompts.
    async fn capabilities(&self) -> ProtocolResult<Vec<Capability>>;

    /// Resolve and run one capability.
    async fn invoke(&self, params: InvokeParams) -> ProtocolResult<Value>;

    /// Handle ping request.
    async fn ping(&self) -> ProtocolResult<Value> {
        Ok(serde_json::json!({}))
    }
}

/// Method dispatcher that routes requests to appropriate handlers.
pub struct Dispatcher<H: Handler> {
    handler: Arc<H>,
}

impl<H: Handler> Dispatcher<H> {
    pub fn new(handler: Arc<H>) -> Self {
        Self { handler }
    }

    /// Dispatch a request and build its response. A handler panic becomes an
    /// application error.
    #[instrument(skip(self, request), fields(method = %request.method))]
    pub async fn dispatch(&self, request: JsonRpcRequest) -> JsonRpcResponse {
        debug!("Dispatching request: {}", request.method);

        let result = if request.jsonrpc != JSONRPC_VERSION {
            Err(ProtocolError::InvalidRequest(
                format!("unsupported jsonrpc version '{}'", request.jsonrpc).into(),
            ))
        } else {
            AssertUnwindSafe(self.route(&request.method, request.params))
                .catch_unwind()
                .await
                .unwrap_or_else(|panic| {
                    Err(ProtocolError::Application(format!(
                        "handler panicked: {}",
                        panic_message(panic.as_ref())
                    )))
                })
        };

        match result {
            Ok(value) => JsonRpcResponse::success(request.id, value),
            Err(e) => {
                error!("Request failed: {}", e);
                JsonRpcResponse::error(request.id, JsonRpcError::new(e.code(), e.to_string()))
            }
        }
    }

    async fn route(&self, method: &str, params: Option<Value>) -> ProtocolResult<Value> {
        match method {
            "capabilities" => self.handle_capabilities().await,
            "invoke" => self.handle_invoke(params).await,
            "ping" => self.handler.ping().await,
            method => {
                warn!("Unknown method: {}", method);
                Err(ProtocolError::MethodNotFound(method.to_string()))
            }
        }
    }

    async fn handle_capabilities(&self) -> ProtocolResult<Value> {
        let capabilities = self.handler.capabilities().await?;
        serde_json::to_value(capabilities)
            .map_err(|e| ProtocolError::InternalError(e.to_string().into()))
    }

    async fn handle_invoke(&self, params: Option<Value>) -> ProtocolResult<Value> {
        let params: InvokeParams = params
            .map(serde_json::from_value)
            .transpose()
            .map_err(|e| ProtocolError::InvalidParams(e.to_string().into()))?
            .ok_or_else(|| ProtocolError::InvalidParams("Missing params".into()))?;

        self.handler.invoke(params).await
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message
    } else {
        "unknown panic"
    }
}
