//! Concurrent execution of independent per-database operations.
//!
//! Every operation in a batch runs as its own task inside its own transaction.
//! A shared semaphore bounds how many of those transactions are open at once;
//! the caller gets one result per operation, in submission order, whatever
//! happened to its siblings.

use crate::config::BatchConfig;
use crate::database::connection::ConnectionManager;
use crate::database::result::{Row, bind_all, decode_rows};
use crate::error::{DatabaseError, DbResult};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use tokio::sync::Semaphore;
use tracing::{Instrument, debug, info_span, warn};

/// One query against one logical database.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchOperation {
    pub database: String,
    pub query: String,
    #[serde(default)]
    pub args: Vec<Value>,
}

impl BatchOperation {
    pub fn new(database: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            query: query.into(),
            args: Vec::new(),
        }
    }

    pub fn with_args(mut self, args: Vec<Value>) -> Self {
        self.args = args;
        self
    }
}

/// Outcome of one batch operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchResult {
    pub database: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results: Option<Vec<Row>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl BatchResult {
    fn succeeded(database: String, rows: Vec<Row>) -> Self {
        Self {
            database,
            success: true,
            results: (!rows.is_empty()).then_some(rows),
            error: None,
        }
    }

    fn failed(database: String, error: String) -> Self {
        Self {
            database,
            success: false,
            results: None,
            error: Some(error),
        }
    }
}

/// Multi-row insert into one table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkInsertOperation {
    pub database: String,
    pub table: String,
    pub columns: Vec<String>,
    pub values: Vec<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_conflict: Option<String>,
}

/// Async callback run inside each unit's transaction before its query.
pub type UnitHook = Arc<dyn Fn(usize) -> BoxFuture<'static, ()> + Send + Sync>;

/// Batch execution counters.
#[derive(Debug, Default)]
pub struct BatchMetrics {
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
    completed: AtomicU64,
    failed: AtomicU64,
}

impl BatchMetrics {
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Highest number of units admitted at the same time since creation.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    fn enter(self: &Arc<Self>) -> InFlightGuard {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        InFlightGuard(Arc::clone(self))
    }

    fn record(&self, result: &BatchResult) {
        if result.success {
            self.completed.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed.fetch_add(1, Ordering::Relaxed);
        }
    }
}

struct InFlightGuard(Arc<BatchMetrics>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Runs batches against databases from a shared [`ConnectionManager`].
pub struct BatchExecutor {
    manager: Arc<ConnectionManager>,
    gate: Arc<Semaphore>,
    max_concurrency: usize,
    metrics: Arc<BatchMetrics>,
    hook: Option<UnitHook>,
}

impl BatchExecutor {
    pub fn new(manager: Arc<ConnectionManager>, config: &BatchConfig) -> Self {
        let max_concurrency = config.max_concurrency.max(1);
        Self {
            manager,
            gate: Arc::new(Semaphore::new(max_concurrency)),
            max_concurrency,
            metrics: Arc::new(BatchMetrics::default()),
            hook: None,
        }
    }

    pub fn with_hook(mut self, hook: UnitHook) -> Self {
        self.hook = Some(hook);
        self
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    pub fn metrics(&self) -> &BatchMetrics {
        &self.metrics
    }

    /// Execute every operation concurrently, at most `max_concurrency` at a
    /// time. Returns exactly one result per operation, in input order.
    pub async fn execute_batch(&self, operations: Vec<BatchOperation>) -> Vec<BatchResult> {
        let mut tasks = Vec::with_capacity(operations.len());

        for (index, operation) in operations.into_iter().enumerate() {
            let database = operation.database.clone();
            let manager = Arc::clone(&self.manager);
            let gate = Arc::clone(&self.gate);
            let metrics = Arc::clone(&self.metrics);
            let hook = self.hook.clone();
            let span = info_span!("batch_unit", index, database = %database);

            let task = tokio::spawn(
                async move {
                    let _permit = gate.acquire_owned().await.map_err(|_| {
                        DatabaseError::Transaction("batch admission gate closed".into())
                    })?;
                    let _in_flight = metrics.enter();
                    run_unit(&manager, index, operation, hook).await
                }
                .instrument(span),
            );
            tasks.push((database, task));
        }

        let mut results = Vec::with_capacity(tasks.len());
        for (database, task) in tasks {
            let result = match task.await {
                Ok(Ok(rows)) => BatchResult::succeeded(database, rows),
                Ok(Err(e)) => BatchResult::failed(database, e.to_string()),
                Err(e) => {
                    warn!(database = %database, error = %e, "Batch unit aborted");
                    BatchResult::failed(database, format!("batch unit aborted: {}", e))
                }
            };
            self.metrics.record(&result);
            results.push(result);
        }

        debug!(
            operations = results.len(),
            failed = results.iter().filter(|r| !r.success).count(),
            "Batch finished"
        );
        results
    }

    /// Insert every row of `operation` with one statement in one transaction.
    pub async fn bulk_insert(&self, operation: BulkInsertOperation) -> DbResult<u64> {
        if operation.values.is_empty() || operation.columns.is_empty() {
            return Err(DatabaseError::QueryFailed(
                "bulk insert requires at least one column and one row".into(),
            ));
        }

        let handle = self.manager.get_connection(&operation.database).await?;
        let mut tx = handle.begin().await?;

        let sql = build_bulk_insert_query(&operation);
        let values: Vec<Value> = operation.values.into_iter().flatten().collect();

        let result = bind_all(sqlx::query(&sql), &values)
            .execute(&mut *tx)
            .await
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;

        tx.commit()
            .await
            .map_err(|e| DatabaseError::Transaction(e.to_string()))?;

        debug!(database = %operation.database, table = %operation.table, rows = result.rows_affected(), "Bulk insert committed");
        Ok(result.rows_affected())
    }
}

/// One unit of a batch. The transaction rolls back on drop unless the
/// commit at the end is reached.
async fn run_unit(
    manager: &ConnectionManager,
    index: usize,
    operation: BatchOperation,
    hook: Option<UnitHook>,
) -> DbResult<Vec<Row>> {
    let handle = manager.get_connection(&operation.database).await?;
    let mut tx = handle.begin().await?;

    if let Some(hook) = hook {
        hook(index).await;
    }

    let rows = bind_all(sqlx::query(&operation.query), &operation.args)
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;
    let rows = decode_rows(&rows)?;

    tx.commit()
        .await
        .map_err(|e| DatabaseError::Transaction(e.to_string()))?;

    Ok(rows)
}

/// `INSERT INTO t (a, b) VALUES (?, ?), (?, ?) [on_conflict]`
pub fn build_bulk_insert_query(operation: &BulkInsertOperation) -> String {
    let row = format!("({})", vec!["?"; operation.columns.len()].join(", "));
    let rows = vec![row.as_str(); operation.values.len()].join(", ");

    let mut sql = format!(
        "INSERT INTO {} ({}) VALUES {}",
        operation.table,
        operation.columns.join(", "),
        rows
    );

    if let Some(clause) = operation.on_conflict.as_deref()
        && !clause.is_empty()
    {
        sql.push(' ');
        sql.push_str(clause);
    }

    sql
}
