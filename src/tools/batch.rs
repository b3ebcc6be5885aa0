//! Batch tools: execute_batch, bulk_insert.

use crate::database::{BatchExecutor, BatchOperation, BulkInsertOperation};
use crate::error::{ToolError, ToolResult};
use crate::security::validate_identifier;
use crate::tools::registry::{Tool, ToolHandler, parse_params};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::{info, instrument};

#[derive(Debug, Deserialize)]
pub struct ExecuteBatchArgs {
    pub operations: Vec<BatchOperation>,
}

pub struct ExecuteBatchTool {
    executor: Arc<BatchExecutor>,
}

impl ExecuteBatchTool {
    pub fn new(executor: Arc<BatchExecutor>) -> Self {
        Self { executor }
    }
}

#[async_trait]
impl ToolHandler for ExecuteBatchTool {
    fn definition(&self) -> Tool {
        crate::define_tool! {
            name: "db/execute_batch",
            description: "Run independent statements concurrently, each in its own transaction. \
                A failing operation does not affect the others; results keep submission order.",
            schema: {
                "type": "object",
                "properties": {
                    "operations": {
                        "type": "array",
                        "items": {
                            "type": "object",
                            "properties": {
                                "database": {"type": "string"},
                                "query": {"type": "string"},
                                "args": {"type": "array"}
                            },
                            "required": ["database", "query"]
                        }
                    }
                },
                "required": ["operations"]
            }
        }
    }

    #[instrument(skip(self, params), fields(tool = "db/execute_batch"))]
    async fn call(&self, params: &[u8]) -> ToolResult<Value> {
        let args: ExecuteBatchArgs = parse_params(params)?;
        let results = self.executor.execute_batch(args.operations).await;

        let succeeded = results.iter().filter(|r| r.success).count();
        let failed = results.len() - succeeded;
        info!(succeeded, failed, "Batch finished");

        Ok(json!({
            "results": results,
            "succeeded": succeeded,
            "failed": failed,
        }))
    }
}

pub struct BulkInsertTool {
    executor: Arc<BatchExecutor>,
}

impl BulkInsertTool {
    pub fn new(executor: Arc<BatchExecutor>) -> Self {
        Self { executor }
    }
}

/// Only `ON CONFLICT ...` clauses are appended to generated inserts.
fn validate_on_conflict(clause: &str) -> ToolResult<()> {
    let trimmed = clause.trim();
    if trimmed.is_empty() {
        return Ok(());
    }
    let upper = trimmed.to_uppercase();
    if !upper.starts_with("ON CONFLICT") || trimmed.contains(';') || trimmed.contains("--") {
        return Err(ToolError::InvalidArguments(format!(
            "invalid on_conflict clause '{}'",
            clause
        )));
    }
    Ok(())
}

#[async_trait]
impl ToolHandler for BulkInsertTool {
    fn definition(&self) -> Tool {
        crate::define_tool! {
            name: "db/bulk_insert",
            description: "Insert many rows into one table atomically with a single statement.",
            schema: {
                "type": "object",
                "properties": {
                    "database": {"type": "string"},
                    "table": {"type": "string"},
                    "columns": {"type": "array", "items": {"type": "string"}},
                    "values": {"type": "array", "items": {"type": "array"}},
                    "on_conflict": {"type": "string", "description": "e.g. ON CONFLICT DO NOTHING"}
                },
                "required": ["database", "table", "columns", "values"]
            }
        }
    }

    #[instrument(skip(self, params), fields(tool = "db/bulk_insert"))]
    async fn call(&self, params: &[u8]) -> ToolResult<Value> {
        let operation: BulkInsertOperation = parse_params(params)?;

        validate_identifier("table", &operation.table)?;
        for column in &operation.columns {
            validate_identifier("column", column)?;
        }
        if let Some(row) = operation
            .values
            .iter()
            .position(|row| row.len() != operation.columns.len())
        {
            return Err(ToolError::InvalidArguments(format!(
                "row {} has {} values, expected {}",
                row,
                operation.values[row].len(),
                operation.columns.len()
            )));
        }
        if let Some(clause) = operation.on_conflict.as_deref() {
            validate_on_conflict(clause)?;
        }

        let rows_affected = self.executor.bulk_insert(operation).await?;
        Ok(json!({ "rows_affected": rows_affected }))
    }
}
