//! MCP server over a registry of SQLite databases.
//!
//! Databases are registered by name in a persistent catalog and opened
//! lazily, one connection per name. Clients list and invoke tools,
//! resources and prompts over line-delimited JSON-RPC on stdio.
//!
//! # Example
//!
//! ```no_run
//! use sqlite_registry_mcp::{
//!     config::ServerConfig,
//!     protocol::McpServerBuilder,
//!     server::{McpHandler, ServerStateBuilder},
//! };
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ServerConfig::builder()
//!         .registry_path("/var/lib/sqlite-mcp/registry.db")
//!         .build()?;
//!
//!     let state = Arc::new(ServerStateBuilder::new().config(config).build().await?);
//!
//!     let server = McpServerBuilder::new()
//!         .handler(McpHandler::new(Arc::clone(&state)))
//!         .build()?;
//!
//!     server.run(CancellationToken::new()).await?;
//!     state.shutdown().await?;
//!     Ok(())
//! }
//! ```

pub mod catalog;
pub mod config;
pub mod database;
pub mod error;
pub mod protocol;
pub mod security;
pub mod server;
pub mod tools;

pub use catalog::{Catalog, DatabaseRecord, DatabaseStatus, NewDatabase};
pub use config::{ServerConfig, ServerConfigBuilder};
pub use database::{BatchExecutor, ConnectionManager, DatabaseHandle};
pub use error::{McpError, Result};
pub use protocol::{McpServer, McpServerBuilder};
pub use security::SqlValidator;
pub use server::{McpHandler, ServerState, ServerStateBuilder};
pub use tools::CapabilityRegistry;
