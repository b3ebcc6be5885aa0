//! Tools, resources and prompts served over the dispatcher.

pub mod batch;
pub mod catalog;
pub mod prompts;
pub mod query;
pub mod registry;
pub mod resources;
pub mod schema;

pub use batch::{BulkInsertTool, ExecuteBatchTool};
pub use catalog::{ListDatabasesTool, RegisterDatabaseTool};
pub use prompts::prompts;
pub use query::{InsertRecordTool, QueryTool};
pub use registry::{
    CapabilityRegistry, CapabilityRegistryBuilder, Prompt, ResourceHandler, Tool, ToolHandler,
    parse_params,
};
pub use resources::DatabasesResource;
pub use schema::{GetSchemaTool, GetTableSchemaTool, GetTablesTool};

use crate::database::{BatchExecutor, ConnectionManager};
use crate::error::ProtocolResult;
use crate::security::SqlValidator;
use std::sync::Arc;

/// Create and register every capability.
pub fn create_registry(
    manager: Arc<ConnectionManager>,
    executor: Arc<BatchExecutor>,
    validator: SqlValidator,
) -> ProtocolResult<CapabilityRegistry> {
    let mut builder = CapabilityRegistry::builder();

    // Catalog
    builder.register_tool(RegisterDatabaseTool::new(Arc::clone(&manager)))?;
    builder.register_tool(ListDatabasesTool::new(Arc::clone(&manager)))?;

    // Statements and schema
    builder.register_tool(GetTableSchemaTool::new(Arc::clone(&manager)))?;
    builder.register_tool(InsertRecordTool::new(Arc::clone(&manager)))?;
    builder.register_tool(QueryTool::new(Arc::clone(&manager), validator))?;
    builder.register_tool(GetTablesTool::new(Arc::clone(&manager)))?;
    builder.register_tool(GetSchemaTool::new(Arc::clone(&manager)))?;

    // Batches
    builder.register_tool(ExecuteBatchTool::new(Arc::clone(&executor)))?;
    builder.register_tool(BulkInsertTool::new(executor))?;

    builder.register_resource(DatabasesResource::new(Arc::clone(manager.catalog())))?;

    for prompt in prompts() {
        builder.register_prompt(prompt)?;
    }

    Ok(builder.build())
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::catalog::{Catalog, NewDatabase};
    use crate::config::PoolConfig;
    use crate::database::ConnectionManager;
    use std::path::Path;
    use std::sync::Arc;
    use tempfile::TempDir;

    /// Manager over an in-memory catalog plus a scratch directory for files.
    pub(crate) async fn manager() -> (TempDir, Arc<ConnectionManager>) {
        let dir = tempfile::tempdir().unwrap();
        let catalog = Arc::new(Catalog::in_memory().await.unwrap());
        let manager = Arc::new(ConnectionManager::new(catalog, PoolConfig::default()));
        (dir, manager)
    }

    pub(crate) async fn register(manager: &ConnectionManager, name: &str, path: &Path, read_only: bool) {
        manager
            .catalog()
            .register(
                NewDatabase::new(name, path)
                    .read_only(read_only)
                    .owner("tester"),
            )
            .await
            .unwrap();
    }

    /// Registers `name` at `<dir>/<name>.sqlite` with a `users` table.
    pub(crate) async fn manager_with_table(name: &str) -> (TempDir, Arc<ConnectionManager>) {
        let (dir, manager) = manager().await;
        let path = dir.path().join(format!("{name}.sqlite"));
        register(&manager, name, &path, false).await;
        manager
            .execute_update(
                name,
                "CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT NOT NULL, age INTEGER DEFAULT 0)",
                &[],
            )
            .await
            .unwrap();
        (dir, manager)
    }
}
