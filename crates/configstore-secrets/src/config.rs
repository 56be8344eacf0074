//! Configuration for the secrets engine.

use std::path::Path;
use std::time::Duration;

use configstore_readdb::ReadModelConfig;
use figment::providers::{Env, Format, Toml};
use figment::Figment;
use serde::Deserialize;

use crate::error::{SecretsError, SecretsResult};
use crate::projection::ProjectionOptions;
use crate::query::{QueryOptions, ShadowPolicy};

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct SecretsConfig {
    /// Read model backend.
    #[serde(default)]
    pub read_model: ReadModelConfig,

    #[serde(default)]
    pub query: QueryConfig,

    #[serde(default)]
    pub projection: ProjectionConfig,
}

impl SecretsConfig {
    /// Load configuration from the default sources.
    ///
    /// Configuration is loaded in the following order (later sources override earlier):
    /// 1. Default values
    /// 2. `configstore.toml` in the current directory (if present)
    /// 3. Environment variables with `CONFIGSTORE_` prefix
    pub fn load() -> SecretsResult<Self> {
        Figment::new()
            .merge(Toml::file("configstore.toml"))
            .merge(Env::prefixed("CONFIGSTORE_").split("__"))
            .extract()
            .map_err(|e| SecretsError::Configuration(e.to_string()))
    }

    /// Load configuration from a specific TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> SecretsResult<Self> {
        Figment::new()
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("CONFIGSTORE_").split("__"))
            .extract()
            .map_err(|e| SecretsError::Configuration(e.to_string()))
    }
}

/// Query service configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct QueryConfig {
    /// Upper bound on acquiring a read snapshot, in milliseconds.
    #[serde(default = "default_snapshot_timeout_ms")]
    pub snapshot_timeout_ms: u64,

    /// Maximum hierarchy depth accepted by traversal and path references.
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,

    #[serde(default)]
    pub shadowing: ShadowPolicy,
}

const fn default_snapshot_timeout_ms() -> u64 {
    5000
}

const fn default_max_depth() -> usize {
    64
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            snapshot_timeout_ms: default_snapshot_timeout_ms(),
            max_depth: default_max_depth(),
            shadowing: ShadowPolicy::default(),
        }
    }
}

impl QueryConfig {
    pub fn to_options(&self) -> QueryOptions {
        QueryOptions {
            snapshot_timeout: Duration::from_millis(self.snapshot_timeout_ms),
            max_depth: self.max_depth,
            shadowing: self.shadowing,
        }
    }
}

/// Projection pipeline configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ProjectionConfig {
    /// Delay before each committed batch reaches the read model.
    #[serde(default)]
    pub propagation_delay_ms: u64,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

const fn default_max_retries() -> u32 {
    3
}

const fn default_retry_backoff_ms() -> u64 {
    50
}

impl Default for ProjectionConfig {
    fn default() -> Self {
        Self {
            propagation_delay_ms: 0,
            max_retries: default_max_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
        }
    }
}

impl ProjectionConfig {
    pub fn to_options(&self) -> ProjectionOptions {
        ProjectionOptions {
            propagation_delay: Duration::from_millis(self.propagation_delay_ms),
            max_retries: self.max_retries,
            retry_backoff: Duration::from_millis(self.retry_backoff_ms),
        }
    }
}
