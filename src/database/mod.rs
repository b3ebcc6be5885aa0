//! Connection management and execution for registered SQLite databases.
//!
//! Each logical database name maps to at most one cached handle whose pool
//! holds a single connection. Batches fan out over those handles under a
//! shared concurrency ceiling.

pub mod batch;
pub mod connection;
pub mod pool;
pub mod result;

pub use batch::{
    BatchExecutor, BatchMetrics, BatchOperation, BatchResult, BulkInsertOperation, UnitHook,
    build_bulk_insert_query,
};
pub use connection::{ConnectionManager, DatabaseHandle};
pub use pool::{PoolMetrics, PoolMetricsSnapshot, PoolOpener, SqliteOpener};
pub use result::*;
