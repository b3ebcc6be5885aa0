//! Server state management.

use crate::catalog::{Catalog, NewDatabase};
use crate::config::ServerConfig;
use crate::database::{BatchExecutor, ConnectionManager};
use crate::error::{CatalogError, ConfigError, Result};
use crate::security::SqlValidator;
use crate::tools::CapabilityRegistry;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{info, warn};

/// Name and id under which the startup database is registered.
pub const DEFAULT_DATABASE_NAME: &str = "default";

pub struct ServerState {
    pub config: ServerConfig,
    pub manager: Arc<ConnectionManager>,
    pub executor: Arc<BatchExecutor>,
    pub capabilities: CapabilityRegistry,
    request_count: AtomicU64,
}

impl ServerState {
    pub fn catalog(&self) -> &Arc<Catalog> {
        self.manager.catalog()
    }

    pub fn next_request_id(&self) -> u64 {
        self.request_count.fetch_add(1, Ordering::SeqCst)
    }

    pub fn request_count(&self) -> u64 {
        self.request_count.load(Ordering::SeqCst)
    }

    /// Register `path` as the `default` database. An existing entry is kept.
    pub async fn register_default_database(&self, path: &Path) -> Result<()> {
        let new = NewDatabase::new(DEFAULT_DATABASE_NAME, path)
            .with_id(DEFAULT_DATABASE_NAME)
            .description("Default database")
            .owner("system");

        match self.catalog().register(new).await {
            Ok(record) => {
                info!(path = %record.path.display(), "Registered default database");
                Ok(())
            }
            Err(CatalogError::DuplicateName(_)) => {
                warn!("Default database already registered, keeping existing entry");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Close every database connection, then the catalog.
    pub async fn shutdown(&self) -> Result<()> {
        let result = self.manager.close_all().await;
        self.catalog().close().await;
        info!(requests = self.request_count(), "Server state shut down");
        Ok(result?)
    }
}

#[derive(Default)]
pub struct ServerStateBuilder {
    config: Option<ServerConfig>,
    catalog: Option<Arc<Catalog>>,
}

impl ServerStateBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Use an already opened catalog instead of `config.registry_path`.
    pub fn catalog(mut self, catalog: Arc<Catalog>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    pub async fn build(self) -> Result<ServerState> {
        let config = self
            .config
            .ok_or_else(|| ConfigError::MissingField("config".into()))?;
        let validator = SqlValidator::new().max_query_length(config.max_query_length);

        let catalog = match self.catalog {
            Some(catalog) => catalog,
            None => Arc::new(Catalog::open(&config.registry_path).await?),
        };
        let manager = Arc::new(ConnectionManager::new(catalog, config.pool.clone()));

        let executor = Arc::new(BatchExecutor::new(Arc::clone(&manager), &config.batch));
        let capabilities =
            crate::tools::create_registry(Arc::clone(&manager), Arc::clone(&executor), validator)?;

        Ok(ServerState {
            config,
            manager,
            executor,
            capabilities,
            request_count: AtomicU64::new(0),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn state() -> ServerState {
        let catalog = Arc::new(Catalog::in_memory().await.unwrap());
        ServerStateBuilder::new()
            .config(ServerConfig::default())
            .catalog(catalog)
            .build()
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_build_requires_config() {
        assert!(ServerStateBuilder::new().build().await.is_err());
    }

    #[tokio::test]
    async fn test_build_opens_registry_from_config() {
        let dir = tempfile::tempdir().unwrap();
        let config = ServerConfig::builder()
            .registry_path(dir.path().join("nested/registry.db"))
            .build()
            .unwrap();

        let state = ServerStateBuilder::new().config(config).build().await.unwrap();
        assert!(dir.path().join("nested/registry.db").exists());
        assert!(!state.capabilities.is_empty());
        state.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_default_database_registered_once() {
        let state = state().await;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("main.db");

        state.register_default_database(&path).await.unwrap();
        state
            .register_default_database(&dir.path().join("other.db"))
            .await
            .unwrap();

        let record = state.catalog().lookup(DEFAULT_DATABASE_NAME).await.unwrap();
        assert_eq!(record.id, DEFAULT_DATABASE_NAME);
        assert_eq!(record.owner, "system");
        assert_eq!(record.path, path);
    }

    #[tokio::test]
    async fn test_default_database_relative_path_fails() {
        let state = state().await;
        assert!(state.register_default_database(Path::new("main.db")).await.is_err());
    }

    #[tokio::test]
    async fn test_query_length_limit_from_config() {
        let catalog = Arc::new(Catalog::in_memory().await.unwrap());
        let config = ServerConfig::builder().max_query_length(16).build().unwrap();
        let state = ServerStateBuilder::new()
            .config(config)
            .catalog(catalog)
            .build()
            .await
            .unwrap();

        let err = state
            .capabilities
            .invoke(
                "db/query",
                br#"{"database_name":"default","query":"SELECT * FROM a_rather_long_table"}"#,
            )
            .await
            .unwrap_err();
        assert!(err.to_string().contains("maximum length of 16"));
    }

    #[tokio::test]
    async fn test_request_counter() {
        let state = state().await;
        assert_eq!(state.next_request_id(), 0);
        assert_eq!(state.next_request_id(), 1);
        assert_eq!(state.request_count(), 2);
    }
}
