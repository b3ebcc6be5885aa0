//! Read-dispatch-write loop.

use crate::error::{McpError, Result};
use crate::protocol::handler::{Dispatcher, Handler};
use crate::protocol::transport::{StdioTransport, Transport};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument};

/// Name and version reported in logs.
#[derive(Debug, Clone)]
pub struct ServerInfo {
    pub name: String,
    pub version: String,
}

/// Serves one client, one request at a time.
pub struct McpServer<H: Handler> {
    info: ServerInfo,
    handler: Arc<H>,
}

impl<H: Handler> McpServer<H> {
    pub fn new(handler: H, info: ServerInfo) -> Self {
        Self {
            info,
            handler: Arc::new(handler),
        }
    }

    pub fn info(&self) -> &ServerInfo {
        &self.info
    }

    /// Run the server with stdio transport.
    #[instrument(skip(self, cancel), fields(server = %self.info.name))]
    pub async fn run(self, cancel: CancellationToken) -> Result<()> {
        let transport = Arc::new(StdioTransport::stdio());
        self.run_with_transport(transport, cancel).await
    }

    /// Run until end of input or cancellation.
    ///
    /// A line that cannot be parsed ends the loop with an error; nothing is
    /// written for it. Every parsed request gets exactly one response line.
    pub async fn run_with_transport<T: Transport + 'static>(
        self,
        transport: Arc<T>,
        cancel: CancellationToken,
    ) -> Result<()> {
        info!(
            "Starting MCP server: {} v{}",
            self.info.name, self.info.version
        );

        let dispatcher = Dispatcher::new(Arc::clone(&self.handler));
        let outcome = self.serve(&dispatcher, transport.as_ref(), &cancel).await;

        match &outcome {
            Ok(()) => info!("Server stopped"),
            Err(e) => error!("Server stopped: {}", e),
        }
        outcome
    }

    async fn serve<T: Transport>(
        &self,
        dispatcher: &Dispatcher<H>,
        transport: &T,
        cancel: &CancellationToken,
    ) -> Result<()> {
        loop {
            let message = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!("Cancellation requested, stopping");
                    return Ok(());
                }
                message = transport.read_message() => message,
            };

            let request = match message {
                Ok(Some(request)) => request,
                Ok(None) => {
                    debug!("EOF received, shutting down");
                    return Ok(());
                }
                Err(e) => return Err(e),
            };

            if request.is_notification() {
                debug!("Notification received: {}", request.method);
            }

            let response = dispatcher.dispatch(request).await;
            transport.write_response(&response).await.map_err(|e| {
                error!("Failed to send response: {}", e);
                e
            })?;
        }
    }
}

/// Builder for MCP Server.
pub struct McpServerBuilder<H: Handler> {
    handler: Option<H>,
    name: String,
    version: String,
}

impl<H: Handler> McpServerBuilder<H> {
    pub fn new() -> Self {
        Self {
            handler: None,
            name: env!("CARGO_PKG_NAME").into(),
            version: env!("CARGO_PKG_VERSION").into(),
        }
    }

    pub fn handler(mut self, handler: H) -> Self {
        self.handler = Some(handler);
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn build(self) -> Result<McpServer<H>> {
        let handler = self.handler.ok_or_else(|| McpError::Internal {
            message: "Handler is required".into(),
        })?;

        Ok(McpServer::new(
            handler,
            ServerInfo {
                name: self.name,
                version: self.version,
            },
        ))
    }
}

impl<H: Handler> Default for McpServerBuilder<H> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ProtocolError, ProtocolResult};
    use crate::protocol::transport::LineTransport;
    use crate::protocol::types::{Capability, InvokeParams};
    use async_trait::async_trait;
    use serde_json::Value;

    struct TestHandler;

    #[async_trait]
    impl Handler for TestHandler {
        async fn capabilities(&self) -> ProtocolResult<Vec<Capability>> {
            Ok(vec![])
        }

        async fn invoke(&self, params: InvokeParams) -> ProtocolResult<Value> {
            Err(ProtocolError::UnknownCapability(params.name))
        }
    }

    type MemoryTransport = LineTransport<&'static [u8], Vec<u8>>;

    fn server() -> McpServer<TestHandler> {
        McpServerBuilder::new()
            .handler(TestHandler)
            .name("test-server")
            .build()
            .unwrap()
    }

    async fn run(input: &'static str, cancel: CancellationToken) -> (Result<()>, Vec<Value>) {
        let transport: Arc<MemoryTransport> = Arc::new(LineTransport::new(input.as_bytes(), Vec::new()));
        let outcome = server()
            .run_with_transport(Arc::clone(&transport), cancel)
            .await;

        let written = match Arc::try_unwrap(transport) {
            Ok(transport) => transport.into_writer(),
            Err(_) => panic!("transport still shared"),
        };
        let lines = String::from_utf8(written)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        (outcome, lines)
    }

    #[test]
    fn test_server_builder() {
        let server = server();
        assert_eq!(server.info().name, "test-server");
        assert_eq!(server.info().version, env!("CARGO_PKG_VERSION"));
    }

    #[tokio::test]
    async fn test_one_response_per_request_until_eof() {
        let input = concat!(
            "{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"ping\"}\n",
            "{\"jsonrpc\":\"2.0\",\"id\":2,\"method\":\"capabilities\"}\n",
            "{\"jsonrpc\":\"2.0\",\"id\":3,\"method\":\"nope\"}\n",
        );

        let (outcome, lines) = run(input, CancellationToken::new()).await;
        assert!(outcome.is_ok());
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0]["id"], 1);
        assert_eq!(lines[1]["result"], serde_json::json!([]));
        assert_eq!(lines[2]["error"]["code"], -32601);
    }

    #[tokio::test]
    async fn test_malformed_line_is_fatal() {
        let input = concat!(
            "{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"ping\"}\n",
            "this is not json\n",
            "{\"jsonrpc\":\"2.0\",\"id\":2,\"method\":\"ping\"}\n",
        );

        let (outcome, lines) = run(input, CancellationToken::new()).await;
        assert!(matches!(
            outcome,
            Err(McpError::Protocol(ProtocolError::ParseError))
        ));
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0]["id"], 1);
    }

    #[tokio::test]
    async fn test_cancelled_before_first_read() {
        let cancel = CancellationToken::new();
        cancel.cancel();

        let (outcome, lines) = run("{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"ping\"}\n", cancel).await;
        assert!(outcome.is_ok());
        assert!(lines.is_empty());
    }

    #[tokio::test]
    async fn test_notification_still_answered() {
        let (outcome, lines) = run("{\"jsonrpc\":\"2.0\",\"method\":\"ping\"}\n", CancellationToken::new()).await;
        assert!(outcome.is_ok());
        assert_eq!(lines.len(), 1);
        assert!(lines[0]["id"].is_null());
        assert_eq!(lines[0]["result"], serde_json::json!({}));
    }

    #[tokio::test]
    async fn test_non_integer_ids_echoed_unchanged() {
        let input = concat!(
            "{\"jsonrpc\":\"2.0\",\"id\":1.5,\"method\":\"ping\"}\n",
            "{\"jsonrpc\":\"2.0\",\"id\":18446744073709551615,\"method\":\"ping\"}\n",
            "{\"jsonrpc\":\"2.0\",\"id\":[\"a\",1],\"method\":\"ping\"}\n",
            "{\"jsonrpc\":\"2.0\",\"id\":4,\"method\":\"ping\"}\n",
        );

        let (outcome, lines) = run(input, CancellationToken::new()).await;
        assert!(outcome.is_ok());
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0]["id"], serde_json::json!(1.5));
        assert_eq!(lines[1]["id"].as_u64(), Some(u64::MAX));
        assert_eq!(lines[2]["id"], serde_json::json!(["a", 1]));
        assert_eq!(lines[3]["id"], 4);
    }

    #[tokio::test]
    async fn test_bad_version_answered_and_loop_continues() {
        let input = concat!(
            "{\"jsonrpc\":\"1.0\",\"id\":1,\"method\":\"ping\"}\n",
            "{\"jsonrpc\":\"2.0\",\"id\":2,\"method\":\"ping\"}\n",
        );

        let (outcome, lines) = run(input, CancellationToken::new()).await;
        assert!(outcome.is_ok());
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["error"]["code"], -32600);
        assert_eq!(lines[1]["id"], 2);
    }
}
