//! Configuration loader with inheritance support.
//!
//! Loads configuration from multiple sources and merges them:
//! 1. Global config: `~/.codeatlas/config.toml`
//! 2. Local config: `.codeatlas/config.toml` (in workspace)
//! 3. Overrides (e.g. indexing request options)
//!
//! Later sources override earlier ones.

use crate::error::ConfigError;
use crate::{AtlasConfig, ConfigOverrides};
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

/// Configuration file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Global configuration directory name.
const GLOBAL_CONFIG_DIR: &str = ".codeatlas";

/// Local configuration directory name.
const LOCAL_CONFIG_DIR: &str = ".codeatlas";

/// Configuration loader with caching and inheritance support.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    /// Global config directory (e.g., `~/.codeatlas`)
    global_config_dir: Option<PathBuf>,

    /// Cached global config
    global_config: Option<AtlasConfig>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Create a new configuration loader.
    ///
    /// Automatically detects the global config directory (`~/.codeatlas`).
    pub fn new() -> Self {
        let global_config_dir = dirs::home_dir().map(|h| h.join(GLOBAL_CONFIG_DIR));

        Self {
            global_config_dir,
            global_config: None,
        }
    }

    /// Create a loader with a custom global config directory.
    ///
    /// Useful for testing.
    pub fn with_global_dir(global_dir: impl Into<PathBuf>) -> Self {
        Self {
            global_config_dir: Some(global_dir.into()),
            global_config: None,
        }
    }

    /// Get the global config file path.
    pub fn global_config_path(&self) -> Option<PathBuf> {
        self.global_config_dir
            .as_ref()
            .map(|d| d.join(CONFIG_FILE_NAME))
    }

    /// Get the local config file path for a workspace.
    pub fn local_config_path(&self, workspace_root: &Path) -> PathBuf {
        workspace_root.join(LOCAL_CONFIG_DIR).join(CONFIG_FILE_NAME)
    }

    /// Load configuration for a workspace with optional overrides.
    ///
    /// Merges config in order: global → local → overrides, then validates
    /// the result.
    pub fn load(
        &mut self,
        workspace_root: &Path,
        overrides: Option<&ConfigOverrides>,
    ) -> Result<AtlasConfig, ConfigError> {
        let mut config = AtlasConfig::default();

        if let Some(global_config) = self.load_global()? {
            config = merge_configs(config, global_config);
        }

        if let Some(local_config) = self.load_local(workspace_root)? {
            config = merge_configs(config, local_config);
        }

        if let Some(ovr) = overrides {
            config.apply_overrides(ovr);
        }

        config
            .validate()
            .map_err(|e| ConfigError::ValidationError(e.to_string()))?;

        Ok(config)
    }

    /// Load only the global configuration.
    pub fn load_global(&mut self) -> Result<Option<AtlasConfig>, ConfigError> {
        if let Some(ref config) = self.global_config {
            return Ok(Some(config.clone()));
        }

        let Some(global_path) = self.global_config_path() else {
            debug!("No home directory found, skipping global config");
            return Ok(None);
        };

        if !global_path.exists() {
            trace!("Global config not found at {:?}", global_path);
            return Ok(None);
        }

        debug!("Loading global config from {:?}", global_path);
        let config = load_config_file(&global_path)?;

        self.global_config = Some(config.clone());

        Ok(Some(config))
    }

    /// Load only the local configuration for a workspace.
    pub fn load_local(&self, workspace_root: &Path) -> Result<Option<AtlasConfig>, ConfigError> {
        let local_path = self.local_config_path(workspace_root);

        if !local_path.exists() {
            trace!("Local config not found at {:?}", local_path);
            return Ok(None);
        }

        debug!("Loading local config from {:?}", local_path);
        load_config_file(&local_path).map(Some)
    }

    /// Save configuration to the global config file.
    pub fn save_global(&self, config: &AtlasConfig) -> Result<(), ConfigError> {
        let Some(ref global_dir) = self.global_config_dir else {
            return Err(ConfigError::NoHomeDir);
        };

        let global_path = global_dir.join(CONFIG_FILE_NAME);
        save_config_file(&global_path, config)
    }

    /// Save configuration to the local config file for a workspace.
    pub fn save_local(&self, workspace_root: &Path, config: &AtlasConfig) -> Result<(), ConfigError> {
        let local_path = self.local_config_path(workspace_root);
        save_config_file(&local_path, config)
    }

    /// Initialize global configuration directory.
    ///
    /// Creates `~/.codeatlas/config.toml` with default configuration.
    pub fn init_global(&self) -> Result<PathBuf, ConfigError> {
        let Some(ref global_dir) = self.global_config_dir else {
            return Err(ConfigError::NoHomeDir);
        };

        if !global_dir.exists() {
            std::fs::create_dir_all(global_dir)
                .map_err(|e| ConfigError::create_dir(global_dir, e))?;
        }

        let config_path = global_dir.join(CONFIG_FILE_NAME);
        if !config_path.exists() {
            let default_config = AtlasConfig::default();
            save_config_file(&config_path, &default_config)?;
        }

        Ok(config_path)
    }

    /// Initialize local configuration for a workspace.
    ///
    /// Creates `.codeatlas/config.toml` with default configuration.
    pub fn init_local(&self, workspace_root: &Path) -> Result<PathBuf, ConfigError> {
        let local_dir = workspace_root.join(LOCAL_CONFIG_DIR);

        if !local_dir.exists() {
            std::fs::create_dir_all(&local_dir)
                .map_err(|e| ConfigError::create_dir(&local_dir, e))?;
        }

        let config_path = local_dir.join(CONFIG_FILE_NAME);
        if !config_path.exists() {
            let default_config = AtlasConfig::default();
            save_config_file(&config_path, &default_config)?;
        }

        Ok(config_path)
    }

    /// Clear cached global configuration.
    ///
    /// Forces reload on next `load_global()` call.
    pub fn clear_cache(&mut self) {
        self.global_config = None;
    }
}

/// Load a configuration file from disk.
fn load_config_file(path: &Path) -> Result<AtlasConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::read_file(path, e))?;

    toml::from_str(&content).map_err(|e| ConfigError::parse_toml(path, e))
}

/// Save a configuration file to disk.
fn save_config_file(path: &Path, config: &AtlasConfig) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        if !parent.exists() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::create_dir(parent, e))?;
        }
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|e| ConfigError::write_file(path, e))
}

/// Merge two configurations, with `overlay` taking precedence.
///
/// Performs a field-by-field merge against hardcoded defaults, so a
/// partial overlay (e.g. a local config that only sets `[indexer]`)
/// doesn't clobber base sections it never mentions.
fn merge_configs(base: AtlasConfig, overlay: AtlasConfig) -> AtlasConfig {
    AtlasConfig {
        relational: merge_relational(base.relational, overlay.relational),
        indexer: merge_indexer(base.indexer, overlay.indexer),
        embedder: merge_embedder(base.embedder, overlay.embedder),
        logging: merge_logging(base.logging, overlay.logging),
    }
}

fn merge_relational(base: crate::RelationalConfig, overlay: crate::RelationalConfig) -> crate::RelationalConfig {
    let default = crate::RelationalConfig::default();
    crate::RelationalConfig {
        host: if overlay.host != default.host { overlay.host } else { base.host },
        port: if overlay.port != default.port { overlay.port } else { base.port },
        user: if overlay.user != default.user { overlay.user } else { base.user },
        password_env: overlay.password_env.or(base.password_env),
        database: if overlay.database != default.database {
            overlay.database
        } else {
            base.database
        },
        sslmode: if overlay.sslmode != default.sslmode { overlay.sslmode } else { base.sslmode },
        max_open_conns: if overlay.max_open_conns != default.max_open_conns {
            overlay.max_open_conns
        } else {
            base.max_open_conns
        },
        max_idle_conns: if overlay.max_idle_conns != default.max_idle_conns {
            overlay.max_idle_conns
        } else {
            base.max_idle_conns
        },
        conn_max_lifetime_secs: if overlay.conn_max_lifetime_secs != default.conn_max_lifetime_secs {
            overlay.conn_max_lifetime_secs
        } else {
            base.conn_max_lifetime_secs
        },
        conn_max_idle_time_secs: if overlay.conn_max_idle_time_secs != default.conn_max_idle_time_secs {
            overlay.conn_max_idle_time_secs
        } else {
            base.conn_max_idle_time_secs
        },
    }
}

fn merge_indexer(base: crate::IndexerConfig, overlay: crate::IndexerConfig) -> crate::IndexerConfig {
    let default = crate::IndexerConfig::default();
    crate::IndexerConfig {
        batch_size: if overlay.batch_size != default.batch_size {
            overlay.batch_size
        } else {
            base.batch_size
        },
        worker_count: if overlay.worker_count != default.worker_count {
            overlay.worker_count
        } else {
            base.worker_count
        },
        skip_vectors: overlay.skip_vectors,
        incremental: overlay.incremental,
        use_transactions: overlay.use_transactions,
        graph_name: if overlay.graph_name != default.graph_name {
            overlay.graph_name
        } else {
            base.graph_name
        },
        embedding_model: if overlay.embedding_model != default.embedding_model {
            overlay.embedding_model
        } else {
            base.embedding_model
        },
        max_ast_nodes_per_file: if overlay.max_ast_nodes_per_file != default.max_ast_nodes_per_file {
            overlay.max_ast_nodes_per_file
        } else {
            base.max_ast_nodes_per_file
        },
    }
}

fn merge_embedder(base: crate::EmbedderSettings, overlay: crate::EmbedderSettings) -> crate::EmbedderSettings {
    let default = crate::EmbedderSettings::default();
    crate::EmbedderSettings {
        backend: overlay.backend,
        api_endpoint: if overlay.api_endpoint != default.api_endpoint {
            overlay.api_endpoint
        } else {
            base.api_endpoint
        },
        api_key_env: overlay.api_key_env.or(base.api_key_env),
        model: if overlay.model != default.model { overlay.model } else { base.model },
        dimensions: if overlay.dimensions != default.dimensions {
            overlay.dimensions
        } else {
            base.dimensions
        },
        batch_size: if overlay.batch_size != default.batch_size {
            overlay.batch_size
        } else {
            base.batch_size
        },
        max_requests_per_second: if overlay.max_requests_per_second != default.max_requests_per_second {
            overlay.max_requests_per_second
        } else {
            base.max_requests_per_second
        },
        max_retries: if overlay.max_retries != default.max_retries {
            overlay.max_retries
        } else {
            base.max_retries
        },
        base_retry_delay_ms: if overlay.base_retry_delay_ms != default.base_retry_delay_ms {
            overlay.base_retry_delay_ms
        } else {
            base.base_retry_delay_ms
        },
        max_retry_delay_ms: if overlay.max_retry_delay_ms != default.max_retry_delay_ms {
            overlay.max_retry_delay_ms
        } else {
            base.max_retry_delay_ms
        },
        timeout_secs: if overlay.timeout_secs != default.timeout_secs {
            overlay.timeout_secs
        } else {
            base.timeout_secs
        },
    }
}

fn merge_logging(base: crate::LoggingConfig, overlay: crate::LoggingConfig) -> crate::LoggingConfig {
    crate::LoggingConfig {
        level: if overlay.level != "info" { overlay.level } else { base.level },
        format: overlay.format,
        file: overlay.file.or(base.file),
    }
}
