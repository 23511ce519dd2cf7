//! Engine configuration.
//!
//! Values come from a TOML file and are then overridden by `METASCOUT_*`
//! environment variables (a `.env` file is honoured). Every field has a
//! default so an empty or absent file is valid.

use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

static DEFAULT_CONFIG_LOCATIONS: Lazy<Vec<PathBuf>> = Lazy::new(|| {
    vec![
        PathBuf::from("metascout.toml"),
        PathBuf::from("config/metascout.toml"),
    ]
});

const ENV_CONFIG_PATH: &str = "METASCOUT_CONFIG";
const ENV_BASE_URL: &str = "METASCOUT_BASE_URL";
const ENV_PAGE_SIZE: &str = "METASCOUT_PAGE_SIZE";
const ENV_BATCH_CONCURRENCY: &str = "METASCOUT_BATCH_CONCURRENCY";
const ENV_BATCH_ROUND_SIZE: &str = "METASCOUT_BATCH_ROUND_SIZE";
const ENV_CACHE_DIR: &str = "METASCOUT_CACHE_DIR";

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoutConfig {
    pub transport: TransportConfig,
    pub search: SearchConfig,
    pub batch: BatchConfig,
    pub persistence: PersistenceConfig,
}

/// Payload framing used by the streaming endpoint.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamFormat {
    #[default]
    Sse,
    Ndjson,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    pub base_url: String,
    pub stream_path: String,
    pub search_path: String,
    pub apply_path: String,
    pub stream_format: StreamFormat,
    pub connect_timeout_ms: u64,
    /// Applies to one-shot requests only; open streams have no deadline.
    pub request_timeout_ms: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            stream_path: "/api/search/stream".to_string(),
            search_path: "/api/search".to_string(),
            apply_path: "/api/scrape".to_string(),
            stream_format: StreamFormat::Sse,
            connect_timeout_ms: 5_000,
            request_timeout_ms: 30_000,
        }
    }
}

impl TransportConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Records requested per `load_more` page.
    pub page_size: usize,
    /// Persistence key for the visible search state.
    pub persist_key: String,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            page_size: 20,
            persist_key: "search-view".to_string(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Maximum item searches in flight at once.
    pub concurrency_limit: usize,
    /// Maximum items attempted per `start()`.
    pub round_size: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            concurrency_limit: 2,
            round_size: 50,
        }
    }
}

impl BatchConfig {
    pub fn concurrency_limit(&self) -> usize {
        self.concurrency_limit.max(1)
    }

    pub fn round_size(&self) -> usize {
        self.round_size.max(1)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    /// On-disk cache directory; in-memory persistence when absent.
    pub cache_dir: Option<PathBuf>,
}

#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("config file {path} does not exist")]
    MissingConfig { path: PathBuf },
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("failed to load env file: {0}")]
    EnvFile(#[from] dotenvy::Error),
    #[error("invalid value for {key}: {value}")]
    InvalidEnv { key: &'static str, value: String },
}

#[derive(Debug, Default, Clone)]
pub struct ConfigLoaderOptions {
    pub config_path: Option<PathBuf>,
    pub env_file: Option<PathBuf>,
}

#[derive(Debug, Default)]
pub struct ConfigLoader {
    options: ConfigLoaderOptions,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: ConfigLoaderOptions) -> Self {
        Self { options }
    }

    pub fn with_config_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.options.config_path = Some(path.into());
        self
    }

    pub fn with_env_file<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.options.env_file = Some(path.into());
        self
    }

    pub fn load(&self) -> Result<ScoutConfig, ConfigLoadError> {
        self.load_env_file()?;

        let mut config = match self.resolve_path() {
            Some((path, explicit)) => {
                if path.exists() {
                    Self::read_file(&path)?
                } else if explicit {
                    return Err(ConfigLoadError::MissingConfig { path });
                } else {
                    ScoutConfig::default()
                }
            }
            None => {
                debug!("no metascout.toml found; using defaults");
                ScoutConfig::default()
            }
        };

        apply_env_overrides(&mut config, |key| dotenvy::var(key).ok())?;
        Ok(config)
    }

    fn load_env_file(&self) -> Result<bool, ConfigLoadError> {
        let loaded = match &self.options.env_file {
            Some(path) => dotenvy::from_path(path).map(|_| true),
            None => dotenvy::dotenv().map(|_| true),
        };
        loaded.or_else(|err| match err {
            dotenvy::Error::Io(_) => Ok(false),
            other => Err(ConfigLoadError::EnvFile(other)),
        })
    }

    /// Explicit path, then `METASCOUT_CONFIG`, then the first default
    /// location that exists. The flag marks paths the caller asked for.
    fn resolve_path(&self) -> Option<(PathBuf, bool)> {
        if let Some(explicit) = &self.options.config_path {
            return Some((explicit.clone(), true));
        }
        if let Ok(from_env) = dotenvy::var(ENV_CONFIG_PATH) {
            return Some((PathBuf::from(from_env), true));
        }
        DEFAULT_CONFIG_LOCATIONS
            .iter()
            .find(|candidate| candidate.exists())
            .map(|path| (path.clone(), false))
    }

    fn read_file(path: &Path) -> Result<ScoutConfig, ConfigLoadError> {
        let contents =
            fs::read_to_string(path).map_err(|source| ConfigLoadError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        let config = toml::from_str(&contents).map_err(|source| {
            ConfigLoadError::Parse {
                path: path.to_path_buf(),
                source,
            }
        })?;
        info!(path = %path.display(), "loaded metascout config");
        Ok(config)
    }
}

fn apply_env_overrides<F>(
    config: &mut ScoutConfig,
    lookup: F,
) -> Result<(), ConfigLoadError>
where
    F: Fn(&'static str) -> Option<String>,
{
    if let Some(url) = lookup(ENV_BASE_URL) {
        config.transport.base_url = url;
    }
    if let Some(value) = lookup(ENV_PAGE_SIZE) {
        config.search.page_size = parse_usize(ENV_PAGE_SIZE, value)?;
    }
    if let Some(value) = lookup(ENV_BATCH_CONCURRENCY) {
        config.batch.concurrency_limit =
            parse_usize(ENV_BATCH_CONCURRENCY, value)?;
    }
    if let Some(value) = lookup(ENV_BATCH_ROUND_SIZE) {
        config.batch.round_size = parse_usize(ENV_BATCH_ROUND_SIZE, value)?;
    }
    if let Some(dir) = lookup(ENV_CACHE_DIR) {
        config.persistence.cache_dir = Some(PathBuf::from(dir));
    }
    Ok(())
}

fn parse_usize(key: &'static str, value: String) -> Result<usize, ConfigLoadError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigLoadError::InvalidEnv { key, value })
}
