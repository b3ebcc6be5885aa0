//! Schema inspection tools: get_table_schema, get_tables, get_schema.

use crate::database::{CellValue, ConnectionManager};
use crate::error::{ToolError, ToolResult};
use crate::security::validate_identifier;
use crate::tools::registry::{Tool, ToolHandler, parse_params};
use async_trait::async_trait;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::instrument;

#[derive(Debug, Deserialize)]
pub struct DatabaseArgs {
    pub database_name: String,
}

#[derive(Debug, Deserialize)]
pub struct TableArgs {
    pub database_name: String,
    pub table_name: String,
}

#[derive(Debug, Serialize)]
pub struct ColumnInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: String,
    pub nullable: bool,
    pub default: Option<String>,
    pub primary_key: bool,
}

#[derive(Debug, Serialize)]
pub struct IndexInfo {
    pub name: String,
    pub sql: Option<String>,
}

fn text(value: Option<&CellValue>) -> Option<String> {
    match value? {
        CellValue::Null => None,
        CellValue::Text(s) => Some(s.clone()),
        CellValue::Int(n) => Some(n.to_string()),
        CellValue::Float(f) => Some(f.to_string()),
        CellValue::Blob(b) => Some(String::from_utf8_lossy(b).into_owned()),
    }
}

fn flag(value: Option<&CellValue>) -> bool {
    value.and_then(CellValue::as_i64).is_some_and(|n| n != 0)
}

pub struct GetTableSchemaTool {
    manager: Arc<ConnectionManager>,
}

impl GetTableSchemaTool {
    pub fn new(manager: Arc<ConnectionManager>) -> Self {
        Self { manager }
    }
}

#[async_trait]
impl ToolHandler for GetTableSchemaTool {
    fn definition(&self) -> Tool {
        crate::define_tool! {
            name: "db/get_table_schema",
            description: "Describe one table: its CREATE statement, columns and indexes.",
            schema: {
                "type": "object",
                "properties": {
                    "database_name": {"type": "string"},
                    "table_name": {"type": "string"}
                },
                "required": ["database_name", "table_name"]
            }
        }
    }

    #[instrument(skip(self, params), fields(tool = "db/get_table_schema"))]
    async fn call(&self, params: &[u8]) -> ToolResult<Value> {
        let args: TableArgs = parse_params(params)?;
        let table = validate_identifier("table", &args.table_name)?;

        let definition = self
            .manager
            .execute_query(
                &args.database_name,
                "SELECT sql FROM sqlite_master WHERE type = 'table' AND name = ?",
                &[Value::from(table)],
            )
            .await?;
        let Some(row) = definition.first() else {
            return Err(ToolError::ExecutionFailed(format!(
                "table '{}' not found in database '{}'",
                table, args.database_name
            )));
        };
        let schema = text(row.get("sql"));

        let columns: Vec<ColumnInfo> = self
            .manager
            .execute_query(
                &args.database_name,
                &format!("PRAGMA table_info({})", table),
                &[],
            )
            .await?
            .iter()
            .map(|row| ColumnInfo {
                name: text(row.get("name")).unwrap_or_default(),
                data_type: text(row.get("type")).unwrap_or_default(),
                nullable: !flag(row.get("notnull")),
                default: text(row.get("dflt_value")),
                primary_key: flag(row.get("pk")),
            })
            .collect();

        let indexes: Vec<IndexInfo> = self
            .manager
            .execute_query(
                &args.database_name,
                "SELECT name, sql FROM sqlite_master WHERE type = 'index' AND tbl_name = ? ORDER BY name",
                &[Value::from(table)],
            )
            .await?
            .iter()
            .map(|row| IndexInfo {
                name: text(row.get("name")).unwrap_or_default(),
                sql: text(row.get("sql")),
            })
            .collect();

        Ok(json!({
            "table_name": table,
            "schema": schema,
            "columns": columns,
            "indexes": indexes,
        }))
    }
}

pub struct GetTablesTool {
    manager: Arc<ConnectionManager>,
}

impl GetTablesTool {
    pub fn new(manager: Arc<ConnectionManager>) -> Self {
        Self { manager }
    }
}

#[async_trait]
impl ToolHandler for GetTablesTool {
    fn definition(&self) -> Tool {
        crate::define_tool! {
            name: "db/get_tables",
            description: "List the tables of a registered database, ordered by name.",
            schema: {
                "type": "object",
                "properties": {
                    "database_name": {"type": "string"}
                },
                "required": ["database_name"]
            }
        }
    }

    #[instrument(skip(self, params), fields(tool = "db/get_tables"))]
    async fn call(&self, params: &[u8]) -> ToolResult<Value> {
        let args: DatabaseArgs = parse_params(params)?;
        let tables = self
            .manager
            .execute_query(
                &args.database_name,
                "SELECT name, type, sql FROM sqlite_master WHERE type = 'table' ORDER BY name",
                &[],
            )
            .await?;

        Ok(json!({
            "database": args.database_name,
            "tables": tables,
        }))
    }
}

#[derive(Debug, Default, Serialize)]
struct TableSchema {
    sql: Option<String>,
    indexes: IndexMap<String, String>,
}

pub struct GetSchemaTool {
    manager: Arc<ConnectionManager>,
}

impl GetSchemaTool {
    pub fn new(manager: Arc<ConnectionManager>) -> Self {
        Self { manager }
    }
}

#[async_trait]
impl ToolHandler for GetSchemaTool {
    fn definition(&self) -> Tool {
        crate::define_tool! {
            name: "db/get_schema",
            description: "Return every table's CREATE statement with its named indexes.",
            schema: {
                "type": "object",
                "properties": {
                    "database_name": {"type": "string"}
                },
                "required": ["database_name"]
            }
        }
    }

    #[instrument(skip(self, params), fields(tool = "db/get_schema"))]
    async fn call(&self, params: &[u8]) -> ToolResult<Value> {
        let args: DatabaseArgs = parse_params(params)?;
        let rows = self
            .manager
            .execute_query(
                &args.database_name,
                "SELECT m.name AS table_name, m.sql AS table_sql, \
                 i.name AS index_name, i.sql AS index_sql \
                 FROM sqlite_master m \
                 LEFT JOIN sqlite_master i ON m.name = i.tbl_name AND i.type = 'index' \
                 WHERE m.type = 'table' \
                 ORDER BY m.name, i.name",
                &[],
            )
            .await?;

        let mut schema: IndexMap<String, TableSchema> = IndexMap::new();
        for row in &rows {
            let Some(table) = text(row.get("table_name")) else {
                continue;
            };
            let entry = schema.entry(table).or_insert_with(|| TableSchema {
                sql: text(row.get("table_sql")),
                indexes: IndexMap::new(),
            });
            // Automatic indexes have no SQL.
            if let (Some(name), Some(sql)) = (text(row.get("index_name")), text(row.get("index_sql"))) {
                entry.indexes.insert(name, sql);
            }
        }

        Ok(json!({
            "database": args.database_name,
            "schema": schema,
        }))
    }
}
