use std::env;
use std::path::PathBuf;
use std::sync::OnceLock;
use thiserror::Error;

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

/// Runtime configuration for the pipeline service and CLI.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Metadata store adapter.
    pub store_backend: StoreBackend,
    /// Base directory of the file store.
    pub data_dir: PathBuf,
    /// Strategy used when callers name none.
    pub default_strategy: String,
    /// Vector size of the hashing embedder.
    pub embedding_dimension: usize,
    /// Result count used when a search does not specify one.
    pub search_default_top_k: usize,
}

/// Supported metadata store adapters.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StoreBackend {
    /// One JSON document per key under `data_dir`.
    File,
    /// Process-local map; nothing survives the process.
    Memory,
}

impl std::str::FromStr for StoreBackend {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "file" => Ok(Self::File),
            "memory" => Ok(Self::Memory),
            _ => Err(()),
        }
    }
}

const DEFAULT_DATA_DIR: &str = "data";
const DEFAULT_STRATEGY: &str = "vector_store";
const DEFAULT_EMBEDDING_DIMENSION: usize = 256;
const DEFAULT_TOP_K: usize = 5;

impl Config {
    /// Load configuration from environment variables, performing validation along the way.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup. Blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let store_backend = match var("DOCPIPE_STORE") {
            Some(value) => value
                .parse()
                .map_err(|()| ConfigError::InvalidValue("DOCPIPE_STORE".to_string()))?,
            None => StoreBackend::File,
        };
        let embedding_dimension =
            parse_or(var("EMBEDDING_DIMENSION"), "EMBEDDING_DIMENSION", DEFAULT_EMBEDDING_DIMENSION)?;
        if embedding_dimension == 0 {
            return Err(ConfigError::InvalidValue("EMBEDDING_DIMENSION".to_string()));
        }

        Ok(Self {
            store_backend,
            data_dir: var("DOCPIPE_DATA_DIR")
                .map_or_else(|| PathBuf::from(DEFAULT_DATA_DIR), PathBuf::from),
            default_strategy: var("DOCPIPE_DEFAULT_STRATEGY")
                .unwrap_or_else(|| DEFAULT_STRATEGY.to_string()),
            embedding_dimension,
            search_default_top_k: parse_or(
                var("SEARCH_DEFAULT_TOP_K"),
                "SEARCH_DEFAULT_TOP_K",
                DEFAULT_TOP_K,
            )?,
        })
    }
}

fn parse_or(value: Option<String>, key: &str, default: usize) -> Result<usize, ConfigError> {
    value
        .map(|value| {
            value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidValue(key.to_string()))
        })
        .transpose()
        .map(|parsed| parsed.unwrap_or(default))
}

/// Global configuration cache populated during process start.
pub static CONFIG: OnceLock<Config> = OnceLock::new();

/// Retrieve the loaded configuration, if [`init_config`] has run.
pub fn get_config() -> Option<&'static Config> {
    CONFIG.get()
}

/// Load `.env` and the environment, then install the result in the global cache.
///
/// A second call returns the configuration installed by the first.
pub fn init_config() -> Result<&'static Config, ConfigError> {
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;
    Ok(CONFIG.get_or_init(|| config))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = load(&[]).unwrap();
        assert_eq!(config.store_backend, StoreBackend::File);
        assert_eq!(config.data_dir, PathBuf::from("data"));
        assert_eq!(config.default_strategy, "vector_store");
        assert_eq!(config.embedding_dimension, 256);
        assert_eq!(config.search_default_top_k, 5);
    }

    #[test]
    fn reads_overrides() {
        let config = load(&[
            ("DOCPIPE_STORE", "Memory"),
            ("DOCPIPE_DATA_DIR", "/tmp/docpipe"),
            ("DOCPIPE_DEFAULT_STRATEGY", "knowledge_graph"),
            ("EMBEDDING_DIMENSION", "64"),
            ("SEARCH_DEFAULT_TOP_K", " 3 "),
        ])
        .unwrap();
        assert_eq!(config.store_backend, StoreBackend::Memory);
        assert_eq!(config.data_dir, PathBuf::from("/tmp/docpipe"));
        assert_eq!(config.default_strategy, "knowledge_graph");
        assert_eq!(config.embedding_dimension, 64);
        assert_eq!(config.search_default_top_k, 3);
    }

    #[test]
    fn blank_values_fall_back_to_defaults() {
        let config = load(&[("DOCPIPE_STORE", "  "), ("EMBEDDING_DIMENSION", "")]).unwrap();
        assert_eq!(config.store_backend, StoreBackend::File);
        assert_eq!(config.embedding_dimension, 256);
    }

    #[test]
    fn rejects_invalid_values() {
        assert_eq!(
            load(&[("DOCPIPE_STORE", "redis")]).unwrap_err(),
            ConfigError::InvalidValue("DOCPIPE_STORE".into())
        );
        assert_eq!(
            load(&[("EMBEDDING_DIMENSION", "0")]).unwrap_err(),
            ConfigError::InvalidValue("EMBEDDING_DIMENSION".into())
        );
        assert_eq!(
            load(&[("SEARCH_DEFAULT_TOP_K", "many")]).unwrap_err(),
            ConfigError::InvalidValue("SEARCH_DEFAULT_TOP_K".into())
        );
    }
}
