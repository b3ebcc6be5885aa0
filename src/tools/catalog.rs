//! Catalog tools: register_database, list_databases.

use crate::catalog::NewDatabase;
use crate::database::ConnectionManager;
use crate::error::{ToolError, ToolResult};
use crate::tools::registry::{Tool, ToolHandler, parse_params};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, instrument};

#[derive(Debug, Deserialize)]
pub struct RegisterDatabaseArgs {
    pub name: String,
    pub path: PathBuf,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub readonly: bool,
    #[serde(default)]
    pub owner: String,
}

pub struct RegisterDatabaseTool {
    manager: Arc<ConnectionManager>,
}

impl RegisterDatabaseTool {
    pub fn new(manager: Arc<ConnectionManager>) -> Self {
        Self { manager }
    }
}

#[async_trait]
impl ToolHandler for RegisterDatabaseTool {
    fn definition(&self) -> Tool {
        crate::define_tool! {
            name: "db/register_database",
            description: "Register a SQLite database file under a unique name. \
                The path must be absolute; the file is created on first use unless readonly.",
            schema: {
                "type": "object",
                "properties": {
                    "name": {"type": "string", "description": "Unique logical name"},
                    "path": {"type": "string", "description": "Absolute path to the SQLite file"},
                    "description": {"type": "string"},
                    "readonly": {"type": "boolean", "default": false},
                    "owner": {"type": "string"}
                },
                "required": ["name", "path", "owner"]
            }
        }
    }

    #[instrument(skip(self, params), fields(tool = "db/register_database"))]
    async fn call(&self, params: &[u8]) -> ToolResult<Value> {
        let args: RegisterDatabaseArgs = parse_params(params)?;
        if args.name.trim().is_empty() {
            return Err(ToolError::InvalidArguments("name must not be empty".into()));
        }

        let record = self
            .manager
            .catalog()
            .register(
                NewDatabase::new(args.name, args.path)
                    .description(args.description)
                    .read_only(args.readonly)
                    .owner(args.owner),
            )
            .await?;

        info!(name = %record.name, "Registered database via tool");
        Ok(json!({
            "id": record.id,
            "name": record.name,
            "status": "registered",
            "message": format!("Database '{}' registered successfully", record.name),
        }))
    }
}

pub struct ListDatabasesTool {
    manager: Arc<ConnectionManager>,
}

impl ListDatabasesTool {
    pub fn new(manager: Arc<ConnectionManager>) -> Self {
        Self { manager }
    }
}

#[async_trait]
impl ToolHandler for ListDatabasesTool {
    fn definition(&self) -> Tool {
        crate::define_tool! {
            name: "db/list_databases",
            description: "List every registered database, ordered by name.",
            schema: {
                "type": "object",
                "properties": {}
            }
        }
    }

    #[instrument(skip(self, _params), fields(tool = "db/list_databases"))]
    async fn call(&self, _params: &[u8]) -> ToolResult<Value> {
        let databases = self.manager.catalog().list().await?;
        Ok(json!({
            "count": databases.len(),
            "databases": databases,
        }))
    }
}
