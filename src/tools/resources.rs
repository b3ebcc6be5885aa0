//! Parameterless resources.

use crate::catalog::Catalog;
use crate::error::ToolResult;
use crate::tools::registry::ResourceHandler;
use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::Arc;

/// Snapshot of the catalog.
pub struct DatabasesResource {
    catalog: Arc<Catalog>,
}

impl DatabasesResource {
    pub fn new(catalog: Arc<Catalog>) -> Self {
        Self { catalog }
    }
}

#[async_trait]
impl ResourceHandler for DatabasesResource {
    fn name(&self) -> &str {
        "db/databases"
    }

    fn description(&self) -> &str {
        "All registered databases"
    }

    async fn read(&self) -> ToolResult<Value> {
        let databases = self.catalog.list().await?;
        Ok(json!({ "databases": databases }))
    }
}
