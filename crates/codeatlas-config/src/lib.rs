//! CodeAtlas configuration management.
//!
//! - Global config: `~/.codeatlas/config.toml`
//! - Local config: `.codeatlas/config.toml` (in the indexed workspace)
//! - Overrides applied last, e.g. from request options or environment
//!
//! Configuration is merged in order: global → local → overrides.

mod error;
mod loader;

pub use error::ConfigError;
pub use loader::ConfigLoader;

use serde::{Deserialize, Serialize};

/// Root configuration for CodeAtlas, mirroring spec §6.5's enumerated
/// option groups one-for-one.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AtlasConfig {
    pub relational: RelationalConfig,
    pub indexer: IndexerConfig,
    pub embedder: EmbedderSettings,
    pub logging: LoggingConfig,
}

impl AtlasConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.indexer.validate()?;
        self.embedder.validate()?;
        Ok(())
    }
}

/// Relational store connection options (spec §6.5 "Relational").
///
/// The concrete store is SQLite via `rusqlite` (see `codeatlas-store`),
/// which has no network endpoint — `host`, `port`, `user`, `password_env`,
/// and `sslmode` are accepted for interface completeness against the
/// enumerated option set but are not consumed by the current backend;
/// `database` is interpreted as the SQLite file path.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelationalConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password_env: Option<String>,
    pub database: String,
    pub sslmode: String,
    pub max_open_conns: u32,
    pub max_idle_conns: u32,
    pub conn_max_lifetime_secs: u64,
    pub conn_max_idle_time_secs: u64,
}

impl Default for RelationalConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            user: "codeatlas".to_string(),
            password_env: Some("CODEATLAS_DB_PASSWORD".to_string()),
            database: ".codeatlas/codeatlas.sqlite".to_string(),
            sslmode: "prefer".to_string(),
            max_open_conns: 10,
            max_idle_conns: 5,
            conn_max_lifetime_secs: 1800,
            conn_max_idle_time_secs: 600,
        }
    }
}

/// Indexer options (spec §6.5 "Indexer").
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexerConfig {
    pub batch_size: usize,
    pub worker_count: usize,
    pub skip_vectors: bool,
    pub incremental: bool,
    /// Retained per spec §9 Open Questions: the source names both a
    /// per-file-transaction rule and this global flag. CodeAtlas always
    /// writes per-file transactions; this field is accepted but unused.
    pub use_transactions: bool,
    pub graph_name: String,
    pub embedding_model: String,
    /// Cap on AST nodes retained per file (spec §9 Open Questions: AST
    /// retention cost is unbounded in the source). Nodes beyond the cap are
    /// dropped with a logged warning rather than failing the file.
    pub max_ast_nodes_per_file: usize,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            worker_count: num_cpus(),
            skip_vectors: false,
            incremental: true,
            use_transactions: true,
            graph_name: "default".to_string(),
            embedding_model: "text-embedding-3-small".to_string(),
            max_ast_nodes_per_file: 5_000,
        }
    }
}

impl IndexerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::invalid_value("indexer.batch_size", "must be >= 1"));
        }
        if self.worker_count == 0 {
            return Err(ConfigError::invalid_value("indexer.worker_count", "must be >= 1"));
        }
        Ok(())
    }
}

fn num_cpus() -> usize {
    std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4)
}

/// Embedder backend selection (spec §6.5 "Embedder").
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EmbedderBackendKind {
    #[default]
    Openai,
    Local,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbedderSettings {
    pub backend: EmbedderBackendKind,
    pub api_endpoint: String,
    pub api_key_env: Option<String>,
    pub model: String,
    pub dimensions: usize,
    pub batch_size: usize,
    pub max_requests_per_second: u32,
    pub max_retries: u32,
    pub base_retry_delay_ms: u64,
    pub max_retry_delay_ms: u64,
    pub timeout_secs: u64,
}

impl Default for EmbedderSettings {
    fn default() -> Self {
        Self {
            backend: EmbedderBackendKind::Openai,
            api_endpoint: "https://api.openai.com/v1".to_string(),
            api_key_env: Some("OPENAI_API_KEY".to_string()),
            model: "text-embedding-3-small".to_string(),
            dimensions: 1536,
            batch_size: 50,
            max_requests_per_second: 10,
            max_retries: 3,
            base_retry_delay_ms: 100,
            max_retry_delay_ms: 5_000,
            timeout_secs: 30,
        }
    }
}

impl EmbedderSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.dimensions == 0 {
            return Err(ConfigError::invalid_value("embedder.dimensions", "must be >= 1"));
        }
        if self.api_endpoint.is_empty() {
            return Err(ConfigError::invalid_value("embedder.api_endpoint", "must not be empty"));
        }
        Ok(())
    }
}

/// Logging configuration, carried regardless of feature Non-goals — every
/// deployment needs structured logs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
    pub file: Option<std::path::PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::default(),
            file: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Overrides applied after global and local config are merged — e.g. from
/// an indexing request's `options` (spec §6.1) or the process environment.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub batch_size: Option<usize>,
    pub worker_count: Option<usize>,
    pub skip_vectors: Option<bool>,
    pub incremental: Option<bool>,
    pub embedding_model: Option<String>,
    pub log_level: Option<String>,
}

impl AtlasConfig {
    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        if let Some(batch_size) = overrides.batch_size {
            self.indexer.batch_size = batch_size;
        }
        if let Some(worker_count) = overrides.worker_count {
            self.indexer.worker_count = worker_count;
        }
        if let Some(skip_vectors) = overrides.skip_vectors {
            self.indexer.skip_vectors = skip_vectors;
        }
        if let Some(incremental) = overrides.incremental {
            self.indexer.incremental = incremental;
        }
        if let Some(ref model) = overrides.embedding_model {
            self.indexer.embedding_model = model.clone();
        }
        if let Some(ref level) = overrides.log_level {
            self.logging.level = level.clone();
        }
    }
}
