//! Error types for the MCP server.
//!
//! Uses `thiserror` for ergonomic error definitions with automatic `From` conversions.

use std::borrow::Cow;
use thiserror::Error;

/// Main error type for the SQLite registry server.
#[derive(Debug, Error)]
pub enum McpError {
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {message}")]
    Internal { message: Cow<'static, str> },
}

/// JSON-RPC 2.0 and capability routing errors.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Parse error: invalid JSON")]
    ParseError,

    #[error("Invalid request: {0}")]
    InvalidRequest(Cow<'static, str>),

    #[error("Method not found: {0}")]
    MethodNotFound(String),

    #[error("Invalid params: {0}")]
    InvalidParams(Cow<'static, str>),

    #[error("Capability not found: {0}")]
    UnknownCapability(String),

    #[error("Capability already registered: {kind} {name}")]
    DuplicateCapability { kind: &'static str, name: String },

    /// A tool or resource handler failed, or panicked.
    #[error("{0}")]
    Application(String),

    #[error("Internal error: {0}")]
    InternalError(Cow<'static, str>),

    /// The response channel could not be written.
    #[error("Transport error: {0}")]
    Transport(Cow<'static, str>),
}

impl ProtocolError {
    /// Returns the JSON-RPC 2.0 error code.
    pub fn code(&self) -> i32 {
        match self {
            Self::ParseError => -32700,
            Self::InvalidRequest(_) => -32600,
            Self::MethodNotFound(_) => -32601,
            Self::InvalidParams(_) => -32602,
            Self::InternalError(_) => -32603,
            Self::Application(_) => -32000,
            Self::UnknownCapability(_) => -32001,
            Self::DuplicateCapability { .. } => -32603,
            Self::Transport(_) => -32000,
        }
    }
}

/// Errors raised by the database catalog.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Database '{0}' is already registered")]
    DuplicateName(String),

    #[error("Database '{0}' not found")]
    NotFound(String),

    #[error("Database path must be absolute: {0}")]
    InvalidPath(String),

    #[error("Catalog storage error: {0}")]
    Storage(#[from] sqlx::Error),
}

/// Connection and execution errors for registered databases.
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Database path must be absolute: {0}")]
    InvalidPath(String),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Query execution failed: {0}")]
    QueryFailed(String),

    #[error("Transaction error: {0}")]
    Transaction(String),

    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required field: {0}")]
    MissingField(Cow<'static, str>),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue {
        field: Cow<'static, str>,
        message: Cow<'static, str>,
    },
}

/// Tool execution errors.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("Query rejected: {0}")]
    Rejected(String),

    #[error(transparent)]
    Database(#[from] DatabaseError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error("Execution failed: {0}")]
    ExecutionFailed(String),
}

impl From<ToolError> for ProtocolError {
    fn from(err: ToolError) -> Self {
        match err {
            ToolError::InvalidArguments(msg) => Self::InvalidParams(msg.into()),
            other => Self::Application(other.to_string()),
        }
    }
}

/// Result type alias for McpError.
pub type Result<T> = std::result::Result<T, McpError>;

/// Result type alias for DatabaseError.
pub type DbResult<T> = std::result::Result<T, DatabaseError>;

/// Result type alias for CatalogError.
pub type CatalogResult<T> = std::result::Result<T, CatalogError>;

/// Result type alias for ProtocolError.
pub type ProtocolResult<T> = std::result::Result<T, ProtocolError>;

/// Result type alias for ToolError.
pub type ToolResult<T> = std::result::Result<T, ToolError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_error_codes() {
        assert_eq!(ProtocolError::ParseError.code(), -32700);
        assert_eq!(ProtocolError::InvalidRequest("test".into()).code(), -32600);
        assert_eq!(ProtocolError::MethodNotFound("test".into()).code(), -32601);
        assert_eq!(ProtocolError::InvalidParams("test".into()).code(), -32602);
        assert_eq!(ProtocolError::InternalError("test".into()).code(), -32603);
        assert_eq!(ProtocolError::Application("boom".into()).code(), -32000);
        assert_eq!(ProtocolError::UnknownCapability("x".into()).code(), -32001);
    }

    #[test]
    fn test_routing_codes_are_distinct() {
        let codes = [
            ProtocolError::MethodNotFound("m".into()).code(),
            ProtocolError::InvalidParams("p".into()).code(),
            ProtocolError::UnknownCapability("c".into()).code(),
            ProtocolError::Application("a".into()).code(),
        ];
        for (i, a) in codes.iter().enumerate() {
            for b in &codes[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn test_tool_error_maps_to_protocol_error() {
        let invalid: ProtocolError = ToolError::InvalidArguments("missing name".into()).into();
        assert_eq!(invalid.code(), -32602);

        let failed: ProtocolError =
            ToolError::Database(DatabaseError::QueryFailed("no such table".into())).into();
        assert_eq!(failed.code(), -32000);
        assert!(failed.to_string().contains("no such table"));
    }

    #[test]
    fn test_error_conversion() {
        let catalog_error = CatalogError::NotFound("main".into());
        let db_error: DatabaseError = catalog_error.into();
        assert!(matches!(db_error, DatabaseError::Catalog(CatalogError::NotFound(_))));

        let mcp_error: McpError = db_error.into();
        assert!(matches!(mcp_error, McpError::Database(_)));
    }
}
