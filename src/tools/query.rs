//! Statement tools: query (read-only) and insert_record.

use crate::database::ConnectionManager;
use crate::error::{ToolError, ToolResult};
use crate::security::{SqlValidator, validate_identifier};
use crate::tools::registry::{Tool, ToolHandler, parse_params};
use async_trait::async_trait;
use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::{debug, instrument};

#[derive(Debug, Deserialize)]
pub struct QueryArgs {
    pub database_name: String,
    pub query: String,
    #[serde(default)]
    pub args: Vec<Value>,
}

pub struct QueryTool {
    manager: Arc<ConnectionManager>,
    validator: SqlValidator,
}

impl QueryTool {
    pub fn new(manager: Arc<ConnectionManager>, validator: SqlValidator) -> Self {
        Self { manager, validator }
    }
}

#[async_trait]
impl ToolHandler for QueryTool {
    fn definition(&self) -> Tool {
        crate::define_tool! {
            name: "db/query",
            description: "Run a read-only query (SELECT, WITH or EXPLAIN) against a registered \
                database. Use ? placeholders with the args array for values.",
            schema: {
                "type": "object",
                "properties": {
                    "database_name": {"type": "string"},
                    "query": {"type": "string"},
                    "args": {"type": "array", "description": "Positional parameter values"}
                },
                "required": ["database_name", "query"]
            }
        }
    }

    #[instrument(skip(self, params), fields(tool = "db/query"))]
    async fn call(&self, params: &[u8]) -> ToolResult<Value> {
        let args: QueryArgs = parse_params(params)?;
        self.validator.validate_read_only(&args.query)?;

        let rows = self
            .manager
            .execute_query(&args.database_name, &args.query, &args.args)
            .await?;
        debug!(database = %args.database_name, rows = rows.len(), "Query returned");

        let columns: Vec<&String> = rows.first().map(|row| row.keys().collect()).unwrap_or_default();
        Ok(json!({
            "columns": columns,
            "rows": rows,
        }))
    }
}

#[derive(Debug, Deserialize)]
pub struct InsertRecordArgs {
    pub database_name: String,
    pub table_name: String,
    pub data: IndexMap<String, Value>,
}

pub struct InsertRecordTool {
    manager: Arc<ConnectionManager>,
}

impl InsertRecordTool {
    pub fn new(manager: Arc<ConnectionManager>) -> Self {
        Self { manager }
    }
}

#[async_trait]
impl ToolHandler for InsertRecordTool {
    fn definition(&self) -> Tool {
        crate::define_tool! {
            name: "db/insert_record",
            description: "Insert one row into a table. Keys of data are column names.",
            schema: {
                "type": "object",
                "properties": {
                    "database_name": {"type": "string"},
                    "table_name": {"type": "string"},
                    "data": {"type": "object", "description": "Column name to value"}
                },
                "required": ["database_name", "table_name", "data"]
            }
        }
    }

    #[instrument(skip(self, params), fields(tool = "db/insert_record"))]
    async fn call(&self, params: &[u8]) -> ToolResult<Value> {
        let args: InsertRecordArgs = parse_params(params)?;
        let table = validate_identifier("table", &args.table_name)?;
        if args.data.is_empty() {
            return Err(ToolError::InvalidArguments("data must not be empty".into()));
        }

        let mut columns = Vec::with_capacity(args.data.len());
        let mut values = Vec::with_capacity(args.data.len());
        for (column, value) in &args.data {
            columns.push(validate_identifier("column", column)?);
            values.push(value.clone());
        }

        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            table,
            columns.join(", "),
            vec!["?"; columns.len()].join(", ")
        );

        let outcome = self
            .manager
            .execute_update(&args.database_name, &sql, &values)
            .await?;

        Ok(json!({
            "id": outcome.last_insert_id,
            "rows_affected": outcome.rows_affected,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::test_support::{manager_with_table, register};

    #[tokio::test]
    async fn test_insert_then_query() {
        let (_dir, manager) = manager_with_table("app").await;
        let insert = InsertRecordTool::new(manager.clone());
        let query = QueryTool::new(manager, SqlValidator::new());

        let inserted = insert
            .call(br#"{"database_name":"app","table_name":"users","data":{"name":"ada","age":36}}"#)
            .await
            .unwrap();
        assert_eq!(inserted["id"], 1);
        assert_eq!(inserted["rows_affected"], 1);

        let out = query
            .call(br#"{"database_name":"app","query":"SELECT id, name, age FROM users WHERE age > ?","args":[18]}"#)
            .await
            .unwrap();
        assert_eq!(out["columns"], json!(["id", "name", "age"]));
        assert_eq!(out["rows"][0]["name"], "ada");
        assert_eq!(out["rows"][0]["age"], 36);
    }

    #[tokio::test]
    async fn test_query_rejects_writes() {
        let (_dir, manager) = manager_with_table("app").await;
        manager
            .execute_update("app", "INSERT INTO users (name, age) VALUES ('kept', 1)", &[])
            .await
            .unwrap();
        let query = QueryTool::new(manager.clone(), SqlValidator::new());

        let err = query
            .call(br#"{"database_name":"app","query":"DELETE FROM users"}"#)
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Rejected(_)));

        let rows = manager
            .execute_query("app", "SELECT name FROM users", &[])
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[tokio::test]
    async fn test_query_empty_result() {
        let (_dir, manager) = manager_with_table("app").await;
        let query = QueryTool::new(manager, SqlValidator::new());

        let out = query
            .call(br#"{"database_name":"app","query":"SELECT * FROM users"}"#)
            .await
            .unwrap();
        assert_eq!(out["rows"], json!([]));
    }

    #[tokio::test]
    async fn test_query_unknown_database() {
        let (_dir, manager) = manager_with_table("app").await;
        let query = QueryTool::new(manager, SqlValidator::new());

        let err = query
            .call(br#"{"database_name":"nope","query":"SELECT 1"}"#)
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Database(_)));
    }

    #[tokio::test]
    async fn test_insert_rejects_bad_identifiers() {
        let (_dir, manager) = manager_with_table("app").await;
        let insert = InsertRecordTool::new(manager);

        let bad_table = insert
            .call(br#"{"database_name":"app","table_name":"users; DROP TABLE users","data":{"name":"x"}}"#)
            .await
            .unwrap_err();
        assert!(matches!(bad_table, ToolError::InvalidArguments(_)));

        let bad_column = insert
            .call(br#"{"database_name":"app","table_name":"users","data":{"name)":"x"}}"#)
            .await
            .unwrap_err();
        assert!(matches!(bad_column, ToolError::InvalidArguments(_)));

        let empty = insert
            .call(br#"{"database_name":"app","table_name":"users","data":{}}"#)
            .await
            .unwrap_err();
        assert!(matches!(empty, ToolError::InvalidArguments(_)));
    }

    #[tokio::test]
    async fn test_insert_into_read_only_database_fails() {
        let (dir, manager) = manager_with_table("app").await;
        register(&manager, "frozen", &dir.path().join("app.sqlite"), true).await;
        let insert = InsertRecordTool::new(manager);

        let err = insert
            .call(br#"{"database_name":"frozen","table_name":"users","data":{"name":"x"}}"#)
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Database(_)));
    }
}
