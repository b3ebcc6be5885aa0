//! Capability request handler backed by the server state.

use crate::error::{ProtocolError, ProtocolResult};
use crate::protocol::{Capability, Handler, InvokeParams};
use crate::server::state::ServerState;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, error};

pub struct McpHandler {
    state: Arc<ServerState>,
}

impl McpHandler {
    pub fn new(state: Arc<ServerState>) -> Self {
        Self { state }
    }

    pub fn state(&self) -> &Arc<ServerState> {
        &self.state
    }
}

#[async_trait]
impl Handler for McpHandler {
    async fn capabilities(&self) -> ProtocolResult<Vec<Capability>> {
        self.state.next_request_id();
        let capabilities = self.state.capabilities.list();
        debug!("Listing {} capabilities", capabilities.len());
        Ok(capabilities)
    }

    async fn invoke(&self, params: InvokeParams) -> ProtocolResult<Value> {
        let request = self.state.next_request_id();
        debug!(request, name = %params.name, "Invoke");

        // Absent params decode as an empty object.
        let bytes = match &params.params {
            Some(value) => serde_json::to_vec(value),
            None => serde_json::to_vec(&Value::Object(Default::default())),
        }
        .map_err(|e| ProtocolError::InvalidParams(e.to_string().into()))?;

        self.state
            .capabilities
            .invoke(&params.name, &bytes)
            .await
            .inspect_err(|e| error!(name = %params.name, "Invocation failed: {}", e))
    }
}
