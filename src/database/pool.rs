//! Per-database pool construction and metrics.

use crate::catalog::DatabaseRecord;
use crate::config::PoolConfig;
use crate::error::{DatabaseError, DbResult};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::sync::atomic::{AtomicU32, Ordering};
use tracing::debug;

/// Opens and closes the single-connection pool behind a logical database.
#[async_trait]
pub trait PoolOpener: Send + Sync {
    async fn open(&self, record: &DatabaseRecord, config: &PoolConfig) -> DbResult<SqlitePool>;

    async fn close(&self, pool: SqlitePool) -> DbResult<()> {
        pool.close().await;
        Ok(())
    }
}

/// Opens database files on disk.
#[derive(Debug, Default, Clone, Copy)]
pub struct SqliteOpener;

#[async_trait]
impl PoolOpener for SqliteOpener {
    async fn open(&self, record: &DatabaseRecord, config: &PoolConfig) -> DbResult<SqlitePool> {
        let options = SqliteConnectOptions::new()
            .filename(&record.path)
            .create_if_missing(!record.read_only)
            .read_only(record.read_only)
            .foreign_keys(true);

        let pool = single_connection_options(config)
            .connect_with(options)
            .await
            .map_err(|e| {
                DatabaseError::ConnectionFailed(format!("{}: {}", record.path.display(), e))
            })?;

        debug!(name = %record.name, path = %record.path.display(), "Opened database");
        Ok(pool)
    }
}

/// Pool options capped at one live connection.
///
/// SQLite admits a single writer, so concurrent callers for the same database
/// queue on `acquire` instead of racing on the file lock.
pub fn single_connection_options(config: &PoolConfig) -> SqlitePoolOptions {
    SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(0)
        .idle_timeout(config.idle_timeout)
        .max_lifetime(config.max_lifetime)
        .acquire_timeout(config.acquire_timeout)
}

/// Pool lifecycle counters.
#[derive(Debug, Default)]
pub struct PoolMetrics {
    pub pools_opened: AtomicU32,
    pub pools_closed: AtomicU32,
    pub open_failures: AtomicU32,
}

impl PoolMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_opened(&self) {
        self.pools_opened.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_closed(&self) {
        self.pools_closed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_open_failure(&self) {
        self.open_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> PoolMetricsSnapshot {
        PoolMetricsSnapshot {
            pools_opened: self.pools_opened.load(Ordering::Relaxed),
            pools_closed: self.pools_closed.load(Ordering::Relaxed),
            open_failures: self.open_failures.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of pool metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolMetricsSnapshot {
    pub pools_opened: u32,
    pub pools_closed: u32,
    pub open_failures: u32,
}
