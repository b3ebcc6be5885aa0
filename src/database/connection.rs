//! Lazily opened, cached connection handles keyed by logical database name.

use crate::catalog::Catalog;
use crate::config::PoolConfig;
use crate::database::pool::{PoolMetrics, PoolOpener, SqliteOpener};
use crate::database::result::{Row, UpdateOutcome, bind_all, decode_rows};
use crate::error::{DatabaseError, DbResult};
use serde_json::Value;
use sqlx::sqlite::{Sqlite, SqlitePool};
use sqlx::Transaction;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Live link to one logical database.
///
/// Clones share the same single-connection pool. `generation` identifies the
/// open that produced the pool, so two handles with the same generation are
/// the same underlying connection.
#[derive(Debug, Clone)]
pub struct DatabaseHandle {
    name: Arc<str>,
    id: Arc<str>,
    generation: u64,
    read_only: bool,
    pool: SqlitePool,
}

impl DatabaseHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Start a transaction. Dropping it without commit rolls back.
    pub async fn begin(&self) -> DbResult<Transaction<'static, Sqlite>> {
        self.pool
            .begin()
            .await
            .map_err(|e| DatabaseError::Transaction(e.to_string()))
    }
}

/// Owns the handle cache for every logical database in the process.
pub struct ConnectionManager {
    catalog: Arc<Catalog>,
    opener: Arc<dyn PoolOpener>,
    pool_config: PoolConfig,
    connections: RwLock<HashMap<String, DatabaseHandle>>,
    next_generation: AtomicU64,
    metrics: PoolMetrics,
}

impl ConnectionManager {
    pub fn new(catalog: Arc<Catalog>, pool_config: PoolConfig) -> Self {
        Self::with_opener(catalog, pool_config, Arc::new(SqliteOpener))
    }

    pub fn with_opener(
        catalog: Arc<Catalog>,
        pool_config: PoolConfig,
        opener: Arc<dyn PoolOpener>,
    ) -> Self {
        Self {
            catalog,
            opener,
            pool_config,
            connections: RwLock::new(HashMap::new()),
            next_generation: AtomicU64::new(1),
            metrics: PoolMetrics::new(),
        }
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    pub fn metrics(&self) -> &PoolMetrics {
        &self.metrics
    }

    /// Return the cached handle for `name`, opening it on first use.
    pub async fn get_connection(&self, name: &str) -> DbResult<DatabaseHandle> {
        if let Some(handle) = self.connections.read().await.get(name) {
            return Ok(handle.clone());
        }

        let mut connections = self.connections.write().await;

        // another caller may have opened it while we waited for the write lock
        if let Some(handle) = connections.get(name) {
            return Ok(handle.clone());
        }

        let record = self.catalog.lookup(name).await?;
        if !record.path.is_absolute() {
            return Err(DatabaseError::InvalidPath(record.path.display().to_string()));
        }

        let pool = match self.opener.open(&record, &self.pool_config).await {
            Ok(pool) => pool,
            Err(e) => {
                self.metrics.record_open_failure();
                return Err(e);
            }
        };
        self.metrics.record_opened();

        let handle = DatabaseHandle {
            name: Arc::from(name),
            id: Arc::from(record.id.as_str()),
            generation: self.next_generation.fetch_add(1, Ordering::Relaxed),
            read_only: record.read_only,
            pool,
        };
        connections.insert(name.to_string(), handle.clone());
        drop(connections);

        info!(name = %name, generation = handle.generation, "Database connection opened");

        if let Err(e) = self.catalog.touch_accessed(&record.id).await {
            warn!(name = %name, error = %e, "Failed to update last access time");
        }

        Ok(handle)
    }

    /// Close and forget the handle for `name`. No-op when not open.
    pub async fn close_connection(&self, name: &str) -> DbResult<()> {
        let handle = self.connections.write().await.remove(name);

        match handle {
            Some(handle) => {
                self.opener.close(handle.pool).await?;
                self.metrics.record_closed();
                debug!(name = %name, "Database connection closed");
                Ok(())
            }
            None => Ok(()),
        }
    }

    /// Close every cached handle. Keeps going past failures and reports the
    /// last one.
    pub async fn close_all(&self) -> DbResult<()> {
        let drained: Vec<(String, DatabaseHandle)> =
            self.connections.write().await.drain().collect();

        let mut last_error = None;
        for (name, handle) in drained {
            match self.opener.close(handle.pool).await {
                Ok(()) => self.metrics.record_closed(),
                Err(e) => {
                    warn!(name = %name, error = %e, "Failed to close database connection");
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    pub async fn is_open(&self, name: &str) -> bool {
        self.connections.read().await.contains_key(name)
    }

    /// Names with a live handle, sorted.
    pub async fn open_connections(&self) -> Vec<String> {
        let mut names: Vec<String> = self.connections.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// Run a row-returning statement outside of any batch.
    pub async fn execute_query(&self, name: &str, sql: &str, args: &[Value]) -> DbResult<Vec<Row>> {
        let handle = self.get_connection(name).await?;
        let rows = bind_all(sqlx::query(sql), args)
            .fetch_all(handle.pool())
            .await
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;
        decode_rows(&rows)
    }

    /// Run a statement that modifies data outside of any batch.
    pub async fn execute_update(
        &self,
        name: &str,
        sql: &str,
        args: &[Value],
    ) -> DbResult<UpdateOutcome> {
        let handle = self.get_connection(name).await?;
        let result = bind_all(sqlx::query(sql), args)
            .execute(handle.pool())
            .await
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;
        Ok(result.into())
    }
}
