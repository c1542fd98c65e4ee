use std::{fs, path::Path};

use figment::{
    providers::{Env, Format, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

/// Environment variables recognized as configuration sources. Values set in
/// the environment override values read from a config file.
const ENV_KEYS: &[&str] = &[
    "storage_connection_string",
    "storage_container_name",
    "search_service_endpoint",
    "search_api_key",
    "search_index_name",
    "sample_documents_path",
];

#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("missing required configuration value: {0}")]
    MissingValue(&'static str),

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("unable to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

fn default_container_name() -> String {
    "legal-documents".to_string()
}

fn default_index_name() -> String {
    "legal-documents-index".to_string()
}

fn default_sample_documents_path() -> String {
    "sample_documents".to_string()
}

fn default_max_retries() -> u32 {
    3
}

fn default_initial_backoff_ms() -> u64 {
    250
}

fn default_max_backoff_ms() -> u64 {
    5_000
}

/// Backoff settings applied to transient backend failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ServerConfig {
    /// Blob storage backend URL, e.g. `s3://bucket`, `az://account/container`,
    /// `file:///var/lib/legalindex/blobs` or `memory:///`.
    #[serde(default)]
    pub storage_connection_string: String,
    #[serde(default = "default_container_name")]
    pub storage_container_name: String,
    #[serde(default)]
    pub search_service_endpoint: String,
    #[serde(default)]
    pub search_api_key: String,
    #[serde(default = "default_index_name")]
    pub search_index_name: String,
    #[serde(default = "default_sample_documents_path")]
    pub sample_documents_path: String,
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            storage_connection_string: String::new(),
            storage_container_name: default_container_name(),
            search_service_endpoint: String::new(),
            search_api_key: String::new(),
            search_index_name: default_index_name(),
            sample_documents_path: default_sample_documents_path(),
            retry: RetryConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from the environment alone.
    pub fn from_env() -> Result<Self, ConfigurationError> {
        let config: ServerConfig = Self::figment(None)
            .extract()
            .map_err(|e| ConfigurationError::Invalid(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML file merged with the environment.
    pub fn from_path(path: &Path) -> Result<Self, ConfigurationError> {
        let config_str = fs::read_to_string(path).map_err(|source| ConfigurationError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let config: ServerConfig = Self::figment(Some(&config_str))
            .extract()
            .map_err(|e| ConfigurationError::Invalid(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn figment(yaml: Option<&str>) -> Figment {
        let mut figment = Figment::new();
        if let Some(yaml) = yaml {
            figment = figment.merge(Yaml::string(yaml));
        }
        figment.merge(Env::raw().only(ENV_KEYS))
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.storage_connection_string.is_empty() {
            return Err(ConfigurationError::MissingValue("storage_connection_string"));
        }
        if self.search_service_endpoint.is_empty() {
            return Err(ConfigurationError::MissingValue("search_service_endpoint"));
        }
        if self.search_api_key.is_empty() {
            return Err(ConfigurationError::MissingValue("search_api_key"));
        }
        Url::parse(&self.storage_connection_string).map_err(|e| {
            ConfigurationError::Invalid(format!(
                "storage_connection_string {}: {}",
                self.storage_connection_string, e
            ))
        })?;
        Url::parse(&self.search_service_endpoint).map_err(|e| {
            ConfigurationError::Invalid(format!(
                "search_service_endpoint {}: {}",
                self.search_service_endpoint, e
            ))
        })?;
        Ok(())
    }

    /// Write a sample config file with placeholder credentials.
    pub fn generate(path: &Path) -> Result<(), ConfigurationError> {
        let config = ServerConfig {
            storage_connection_string: "file:///var/lib/legalindex/blobs".to_string(),
            search_service_endpoint: "https://localhost:9200".to_string(),
            search_api_key: "changeme".to_string(),
            ..Default::default()
        };
        let body = serde_yaml::to_string(&config)
            .map_err(|e| ConfigurationError::Invalid(e.to_string()))?;
        fs::write(path, body).map_err(|source| ConfigurationError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Ok(())
    }
}
