//! Configuration types and builders.

use crate::error::{ConfigError, McpError, Result};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Default number of batch operations allowed in flight at once.
pub const DEFAULT_BATCH_CONCURRENCY: usize = 5;

/// Longest query text `db/query` accepts, in bytes.
pub const DEFAULT_MAX_QUERY_LENGTH: usize = 100_000;

/// Per-database pool settings.
///
/// The pool size itself is not configurable: every logical database gets
/// exactly one live connection because SQLite allows a single writer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Close the connection after it sits idle this long.
    pub idle_timeout: Option<Duration>,
    /// Recycle the connection after this long regardless of use.
    pub max_lifetime: Option<Duration>,
    /// How long a caller waits for the single connection before giving up.
    pub acquire_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            idle_timeout: Some(Duration::from_secs(600)),
            max_lifetime: Some(Duration::from_secs(3600)),
            acquire_timeout: Duration::from_secs(30),
        }
    }
}

/// Batch executor settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    pub max_concurrency: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_concurrency: DEFAULT_BATCH_CONCURRENCY,
        }
    }
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub name: Cow<'static, str>,
    pub version: Cow<'static, str>,
    /// Location of the catalog database.
    pub registry_path: PathBuf,
    /// Database registered as `default` at startup, if any.
    pub default_database: Option<PathBuf>,
    pub pool: PoolConfig,
    pub batch: BatchConfig,
    pub max_query_length: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: env!("CARGO_PKG_NAME").into(),
            version: env!("CARGO_PKG_VERSION").into(),
            registry_path: PathBuf::from("registry.db"),
            default_database: None,
            pool: PoolConfig::default(),
            batch: BatchConfig::default(),
            max_query_length: DEFAULT_MAX_QUERY_LENGTH,
        }
    }
}

impl ServerConfig {
    pub fn builder() -> ServerConfigBuilder {
        ServerConfigBuilder::default()
    }
}

/// Builder for ServerConfig with fluent API.
#[derive(Default)]
pub struct ServerConfigBuilder {
    config: ServerConfig,
}

impl ServerConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(mut self, name: impl Into<Cow<'static, str>>) -> Self {
        self.config.name = name.into();
        self
    }

    pub fn registry_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.registry_path = path.into();
        self
    }

    pub fn default_database(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.default_database = Some(path.into());
        self
    }

    pub fn batch_concurrency(mut self, max_concurrency: usize) -> Self {
        self.config.batch.max_concurrency = max_concurrency;
        self
    }

    pub fn idle_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.config.pool.idle_timeout = timeout;
        self
    }

    pub fn max_lifetime(mut self, lifetime: Option<Duration>) -> Self {
        self.config.pool.max_lifetime = lifetime;
        self
    }

    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.config.pool.acquire_timeout = timeout;
        self
    }

    pub fn max_query_length(mut self, length: usize) -> Self {
        self.config.max_query_length = length;
        self
    }

    /// Overlay settings from environment variables.
    pub fn from_env(mut self) -> Result<Self> {
        if let Ok(path) = env::var("SQLITE_MCP_REGISTRY") {
            self.config.registry_path = PathBuf::from(path);
        }

        if let Ok(path) = env::var("SQLITE_MCP_DEFAULT_DB")
            && !path.is_empty()
        {
            self.config.default_database = Some(PathBuf::from(path));
        }

        if let Ok(value) = env::var("SQLITE_MCP_BATCH_CONCURRENCY") {
            self.config.batch.max_concurrency =
                parse_env("SQLITE_MCP_BATCH_CONCURRENCY", &value)?;
        }

        if let Ok(value) = env::var("SQLITE_MCP_IDLE_TIMEOUT_SECS") {
            let secs: u64 = parse_env("SQLITE_MCP_IDLE_TIMEOUT_SECS", &value)?;
            self.config.pool.idle_timeout = (secs > 0).then(|| Duration::from_secs(secs));
        }

        if let Ok(value) = env::var("SQLITE_MCP_MAX_LIFETIME_SECS") {
            let secs: u64 = parse_env("SQLITE_MCP_MAX_LIFETIME_SECS", &value)?;
            self.config.pool.max_lifetime = (secs > 0).then(|| Duration::from_secs(secs));
        }

        if let Ok(value) = env::var("SQLITE_MCP_MAX_QUERY_LENGTH") {
            self.config.max_query_length = parse_env("SQLITE_MCP_MAX_QUERY_LENGTH", &value)?;
        }

        Ok(self)
    }

    pub fn build(self) -> Result<ServerConfig> {
        self.validate()?;
        Ok(self.config)
    }

    fn validate(&self) -> Result<()> {
        if self.config.registry_path.as_os_str().is_empty() {
            return Err(ConfigError::MissingField("registry_path".into()).into());
        }
        if self.config.batch.max_concurrency == 0 {
            return Err(ConfigError::InvalidValue {
                field: "batch.max_concurrency".into(),
                message: "Batch concurrency must be greater than 0".into(),
            }
            .into());
        }
        if self.config.max_query_length == 0 {
            return Err(ConfigError::InvalidValue {
                field: "max_query_length".into(),
                message: "Maximum query length must be greater than 0".into(),
            }
            .into());
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(field: &'static str, value: &str) -> Result<T> {
    value.trim().parse().map_err(|_| {
        McpError::Config(ConfigError::InvalidValue {
            field: field.into(),
            message: format!("cannot parse '{}'", value).into(),
        })
    })
}
