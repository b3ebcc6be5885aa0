//! Persistent catalog of registered databases.
//!
//! The catalog is itself a SQLite database holding one row per logical
//! database name plus a free-form key/value table per database. Names are
//! unique; records are only ever inserted and touched, never deleted.

use crate::error::{CatalogError, CatalogResult};
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, info};
use uuid::Uuid;

const CREATE_DATABASES_TABLE: &str = "
CREATE TABLE IF NOT EXISTS registered_databases (
    id TEXT PRIMARY KEY,
    name TEXT UNIQUE NOT NULL,
    path TEXT NOT NULL,
    description TEXT,
    readonly BOOLEAN DEFAULT FALSE,
    created_at TIMESTAMP NOT NULL,
    last_accessed TIMESTAMP,
    owner TEXT NOT NULL,
    status TEXT CHECK(status IN ('active', 'inactive', 'error')) DEFAULT 'active'
)";

const CREATE_METADATA_TABLE: &str = "
CREATE TABLE IF NOT EXISTS database_metadata (
    database_id TEXT REFERENCES registered_databases(id),
    key TEXT NOT NULL,
    value TEXT,
    PRIMARY KEY (database_id, key)
)";

const SELECT_RECORD: &str = "
SELECT id, name, path, description, readonly, created_at, last_accessed, owner, status
FROM registered_databases";

/// Lifecycle status of a registered database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseStatus {
    #[default]
    Active,
    Inactive,
    Error,
}

impl DatabaseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
            Self::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(Self::Active),
            "inactive" => Some(Self::Inactive),
            "error" => Some(Self::Error),
            _ => None,
        }
    }
}

/// A registered database as stored in the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseRecord {
    pub id: String,
    pub name: String,
    pub path: PathBuf,
    pub description: String,
    #[serde(rename = "readonly")]
    pub read_only: bool,
    pub owner: String,
    pub status: DatabaseStatus,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_accessed: Option<DateTime<Utc>>,
}

/// Registration request. The id is generated when not supplied.
#[derive(Debug, Clone, Default)]
pub struct NewDatabase {
    pub id: Option<String>,
    pub name: String,
    pub path: PathBuf,
    pub description: String,
    pub read_only: bool,
    pub owner: String,
}

impl NewDatabase {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            ..Default::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    pub fn owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = owner.into();
        self
    }
}

#[derive(sqlx::FromRow)]
struct DatabaseRow {
    id: String,
    name: String,
    path: String,
    description: Option<String>,
    readonly: bool,
    created_at: DateTime<Utc>,
    last_accessed: Option<DateTime<Utc>>,
    owner: String,
    status: String,
}

impl DatabaseRow {
    fn into_record(self) -> DatabaseRecord {
        DatabaseRecord {
            id: self.id,
            name: self.name,
            path: PathBuf::from(self.path),
            description: self.description.unwrap_or_default(),
            read_only: self.readonly,
            owner: self.owner,
            // the CHECK constraint keeps this exhaustive for rows we wrote
            status: DatabaseStatus::parse(&self.status).unwrap_or(DatabaseStatus::Error),
            created_at: self.created_at,
            last_accessed: self.last_accessed,
        }
    }
}

/// Catalog of logical database names backed by a SQLite file.
pub struct Catalog {
    pool: SqlitePool,
}

impl Catalog {
    /// Open (or create) the catalog stored at `path`.
    pub async fn open(path: impl AsRef<Path>) -> CatalogResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| CatalogError::Storage(sqlx::Error::Io(e)))?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        let catalog = Self { pool };
        catalog.ensure_schema().await?;
        info!("Catalog opened at {}", path.display());
        Ok(catalog)
    }

    /// Ephemeral catalog for tests and throwaway sessions.
    ///
    /// An in-memory SQLite database lives only as long as its connection, so
    /// the pool pins exactly one connection and never recycles it.
    pub async fn in_memory() -> CatalogResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        let catalog = Self { pool };
        catalog.ensure_schema().await?;
        debug!("In-memory catalog created");
        Ok(catalog)
    }

    async fn ensure_schema(&self) -> CatalogResult<()> {
        sqlx::query(CREATE_DATABASES_TABLE)
            .execute(&self.pool)
            .await?;
        sqlx::query(CREATE_METADATA_TABLE)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Register a new database. The record is stored with status `active`
    /// and no last-accessed time, or not at all.
    pub async fn register(&self, new: NewDatabase) -> CatalogResult<DatabaseRecord> {
        if !new.path.is_absolute() {
            return Err(CatalogError::InvalidPath(new.path.display().to_string()));
        }

        let record = DatabaseRecord {
            id: new.id.unwrap_or_else(|| Uuid::new_v4().to_string()),
            name: new.name,
            path: new.path,
            description: new.description,
            read_only: new.read_only,
            owner: new.owner,
            status: DatabaseStatus::Active,
            created_at: Utc::now(),
            last_accessed: None,
        };

        let mut tx = self.pool.begin().await?;

        let existing: Option<i64> =
            sqlx::query_scalar("SELECT 1 FROM registered_databases WHERE name = ?")
                .bind(&record.name)
                .fetch_optional(&mut *tx)
                .await?;
        if existing.is_some() {
            return Err(CatalogError::DuplicateName(record.name));
        }

        sqlx::query(
            "INSERT INTO registered_databases
                (id, name, path, description, readonly, created_at, owner, status)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&record.id)
        .bind(&record.name)
        .bind(record.path.to_string_lossy().into_owned())
        .bind(&record.description)
        .bind(record.read_only)
        .bind(record.created_at)
        .bind(&record.owner)
        .bind(record.status.as_str())
        .execute(&mut *tx)
        .await
        .map_err(|e| classify_insert_error(e, &record.name))?;

        tx.commit().await?;

        info!(id = %record.id, name = %record.name, "Database registered");
        Ok(record)
    }

    /// Look up a record by its logical name.
    pub async fn lookup(&self, name: &str) -> CatalogResult<DatabaseRecord> {
        let row: Option<DatabaseRow> = sqlx::query_as(&format!("{SELECT_RECORD} WHERE name = ?"))
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;

        row.map(DatabaseRow::into_record)
            .ok_or_else(|| CatalogError::NotFound(name.to_string()))
    }

    /// Stamp the record's last-accessed time with the current time.
    ///
    /// Callers treat failure here as advisory and keep going.
    pub async fn touch_accessed(&self, id: &str) -> CatalogResult<()> {
        sqlx::query("UPDATE registered_databases SET last_accessed = ? WHERE id = ?")
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// All records, ordered by name.
    pub async fn list(&self) -> CatalogResult<Vec<DatabaseRecord>> {
        let rows: Vec<DatabaseRow> = sqlx::query_as(&format!("{SELECT_RECORD} ORDER BY name ASC"))
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(DatabaseRow::into_record).collect())
    }

    /// Insert or replace one metadata entry for a database.
    pub async fn set_metadata(&self, database_id: &str, key: &str, value: &str) -> CatalogResult<()> {
        sqlx::query(
            "INSERT INTO database_metadata (database_id, key, value) VALUES (?, ?, ?)
             ON CONFLICT(database_id, key) DO UPDATE SET value = excluded.value",
        )
        .bind(database_id)
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Metadata entries for a database, ordered by key.
    pub async fn metadata(&self, database_id: &str) -> CatalogResult<IndexMap<String, String>> {
        let rows: Vec<(String, Option<String>)> = sqlx::query_as(
            "SELECT key, value FROM database_metadata WHERE database_id = ? ORDER BY key",
        )
        .bind(database_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(key, value)| (key, value.unwrap_or_default()))
            .collect())
    }

    pub async fn close(&self) {
        self.pool.close().await;
        debug!("Catalog closed");
    }
}

fn classify_insert_error(err: sqlx::Error, name: &str) -> CatalogError {
    if let Some(db_err) = err.as_database_error()
        && db_err.is_unique_violation()
        && db_err.message().contains("registered_databases.name")
    {
        return CatalogError::DuplicateName(name.to_string());
    }
    CatalogError::Storage(err)
}
