//! Sink Configuration
//!
//! Loaded from connector-style properties (`from_props`), a TOML file
//! (`from_toml_str` / `from_file`) or `SINK_*` environment variables
//! (`from_env`). Every field has a default; `validate()` checks what the
//! selected store type needs.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_BASE_PATH: &str = "kafka-export";
pub const DEFAULT_FLUSH_MAX_RECORDS: usize = 500;
pub const DEFAULT_RETRY_MAX_ATTEMPTS: u32 = 3;

pub const ACCOUNT_NAME_CONFIG: &str = "adls.account.name";
pub const FILESYSTEM_CONFIG: &str = "adls.filesystem";
pub const ENDPOINT_CONFIG: &str = "adls.endpoint";
pub const BASE_PATH_CONFIG: &str = "adls.base.path";
pub const SAS_TOKEN_CONFIG: &str = "adls.sas.token";
pub const RETRY_MAX_ATTEMPTS_CONFIG: &str = "adls.retry.max.attempts";
pub const FLUSH_MAX_RECORDS_CONFIG: &str = "flush.max.records";
pub const FLUSH_INTERVAL_MS_CONFIG: &str = "flush.interval.ms";
pub const COMPRESS_GZIP_CONFIG: &str = "compress.gzip";
pub const STORE_TYPE_CONFIG: &str = "sink.store.type";
pub const LOCAL_PATH_CONFIG: &str = "sink.local.path";

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required setting `{0}`")]
    Missing(&'static str),

    #[error("invalid value for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Credential that never shows up in logs or debug output
#[derive(Clone, Default, PartialEq, Eq)]
pub struct SecretString(String);

impl SecretString {
    /// Store a SAS token, dropping a leading `?`
    pub fn new(token: impl Into<String>) -> Self {
        let token = token.into();
        match token.strip_prefix('?') {
            Some(rest) => SecretString(rest.to_string()),
            None => SecretString(token),
        }
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "***")
    }
}

impl fmt::Display for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "***")
    }
}

impl Serialize for SecretString {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str("***")
    }
}

impl<'de> Deserialize<'de> for SecretString {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(SecretString::new)
    }
}

/// Type of blob store backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreType {
    /// In-memory store (for tests)
    InMemory,
    /// Local filesystem
    LocalFs,
    /// Azure Data Lake Storage Gen2
    Azure,
}

impl FromStr for StoreType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "memory" | "in_memory" | "inmemory" => Ok(StoreType::InMemory),
            "localfs" | "local_fs" | "local" => Ok(StoreType::LocalFs),
            "azure" | "adls" => Ok(StoreType::Azure),
            other => Err(ConfigError::Invalid {
                key: STORE_TYPE_CONFIG,
                reason: format!("unknown store type `{}`", other),
            }),
        }
    }
}

/// Main configuration for a sink task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SinkConfig {
    /// Backend the task writes to
    pub store_type: StoreType,
    /// Root directory (for LocalFs store)
    pub local_path: Option<PathBuf>,
    /// Storage account name
    pub account_name: String,
    /// Filesystem (container) name
    pub filesystem: String,
    /// Override of the account's default endpoint
    pub endpoint: Option<String>,
    /// SAS token, without leading '?'
    pub sas_token: SecretString,
    /// Prefix of every object key
    pub base_path: String,
    /// Records per object
    pub flush_max_records: usize,
    /// Gzip objects (adds `.gz` to the key)
    pub compress_gzip: bool,
    /// Transport-level retries per request; not used by the flush logic
    pub retry_max_attempts: u32,
    /// Maximum age of a non-empty buffer in ms; 0 disables
    pub flush_interval_ms: u64,
}

impl Default for SinkConfig {
    fn default() -> Self {
        SinkConfig {
            store_type: StoreType::Azure,
            local_path: None,
            account_name: String::new(),
            filesystem: String::new(),
            endpoint: None,
            sas_token: SecretString::default(),
            base_path: DEFAULT_BASE_PATH.to_string(),
            flush_max_records: DEFAULT_FLUSH_MAX_RECORDS,
            compress_gzip: false,
            retry_max_attempts: DEFAULT_RETRY_MAX_ATTEMPTS,
            flush_interval_ms: 0,
        }
    }
}

impl SinkConfig {
    /// Create config for local development
    pub fn local(path: PathBuf) -> Self {
        SinkConfig {
            store_type: StoreType::LocalFs,
            local_path: Some(path),
            ..Default::default()
        }
    }

    /// Create config for testing (in-memory)
    pub fn test() -> Self {
        SinkConfig {
            store_type: StoreType::InMemory,
            flush_max_records: 2,
            ..Default::default()
        }
    }

    /// Build from connector-style properties (`adls.*`, `flush.*`, ...)
    pub fn from_props(props: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let mut config = SinkConfig::default();

        if let Some(v) = props.get(STORE_TYPE_CONFIG) {
            config.store_type = v.parse()?;
        }
        if let Some(v) = props.get(LOCAL_PATH_CONFIG) {
            config.local_path = Some(PathBuf::from(v));
        }
        if let Some(v) = props.get(ACCOUNT_NAME_CONFIG) {
            config.account_name = v.clone();
        }
        if let Some(v) = props.get(FILESYSTEM_CONFIG) {
            config.filesystem = v.clone();
        }
        if let Some(v) = props.get(ENDPOINT_CONFIG) {
            config.endpoint = Some(v.clone());
        }
        if let Some(v) = props.get(SAS_TOKEN_CONFIG) {
            config.sas_token = SecretString::new(v.as_str());
        }
        if let Some(v) = props.get(BASE_PATH_CONFIG) {
            config.base_path = v.clone();
        }
        if let Some(v) = props.get(FLUSH_MAX_RECORDS_CONFIG) {
            config.flush_max_records = parse_value(FLUSH_MAX_RECORDS_CONFIG, v)?;
        }
        if let Some(v) = props.get(COMPRESS_GZIP_CONFIG) {
            config.compress_gzip = parse_value(COMPRESS_GZIP_CONFIG, v)?;
        }
        if let Some(v) = props.get(RETRY_MAX_ATTEMPTS_CONFIG) {
            config.retry_max_attempts = parse_value(RETRY_MAX_ATTEMPTS_CONFIG, v)?;
        }
        if let Some(v) = props.get(FLUSH_INTERVAL_MS_CONFIG) {
            config.flush_interval_ms = parse_value(FLUSH_INTERVAL_MS_CONFIG, v)?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: SinkConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Load from environment variables
    ///
    /// `SINK_CONFIG` names a TOML file used as the base; individual
    /// `SINK_*` variables override it.
    pub fn from_env() -> Result<Self, ConfigError> {
        let vars: HashMap<String, String> = std::env::vars().collect();
        Self::from_env_map(&vars)
    }

    fn from_env_map(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let mut config = match vars.get("SINK_CONFIG") {
            Some(path) => {
                let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
                    path: PathBuf::from(path),
                    source,
                })?;
                toml::from_str(&text)?
            }
            None => SinkConfig::default(),
        };

        if let Some(v) = vars.get("SINK_STORE_TYPE") {
            config.store_type = v.parse()?;
        }
        if let Some(v) = vars.get("SINK_LOCAL_PATH") {
            config.local_path = Some(PathBuf::from(v));
        }
        if let Some(v) = vars.get("SINK_ACCOUNT_NAME") {
            config.account_name = v.clone();
        }
        if let Some(v) = vars.get("SINK_FILESYSTEM") {
            config.filesystem = v.clone();
        }
        if let Some(v) = vars.get("SINK_ENDPOINT") {
            config.endpoint = Some(v.clone());
        }
        if let Some(v) = vars.get("SINK_SAS_TOKEN") {
            config.sas_token = SecretString::new(v.as_str());
        }
        if let Some(v) = vars.get("SINK_BASE_PATH") {
            config.base_path = v.clone();
        }
        if let Some(v) = vars.get("SINK_FLUSH_MAX_RECORDS") {
            config.flush_max_records = parse_value(FLUSH_MAX_RECORDS_CONFIG, v)?;
        }
        if let Some(v) = vars.get("SINK_COMPRESS_GZIP") {
            config.compress_gzip = parse_value(COMPRESS_GZIP_CONFIG, v)?;
        }
        if let Some(v) = vars.get("SINK_RETRY_MAX_ATTEMPTS") {
            config.retry_max_attempts = parse_value(RETRY_MAX_ATTEMPTS_CONFIG, v)?;
        }
        if let Some(v) = vars.get("SINK_FLUSH_INTERVAL_MS") {
            config.flush_interval_ms = parse_value(FLUSH_INTERVAL_MS_CONFIG, v)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Check the settings the selected store type needs
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.flush_max_records == 0 {
            return Err(ConfigError::Invalid {
                key: FLUSH_MAX_RECORDS_CONFIG,
                reason: "must be at least 1".to_string(),
            });
        }
        match self.store_type {
            StoreType::InMemory => {}
            StoreType::LocalFs => {
                if self.local_path.is_none() {
                    return Err(ConfigError::Missing(LOCAL_PATH_CONFIG));
                }
            }
            StoreType::Azure => {
                if self.account_name.is_empty() {
                    return Err(ConfigError::Missing(ACCOUNT_NAME_CONFIG));
                }
                if self.filesystem.is_empty() {
                    return Err(ConfigError::Missing(FILESYSTEM_CONFIG));
                }
                if self.sas_token.is_empty() {
                    return Err(ConfigError::Missing(SAS_TOKEN_CONFIG));
                }
            }
        }
        Ok(())
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }

    /// One config per task instance; every task gets the same settings
    pub fn task_configs(&self, max_tasks: usize) -> Vec<SinkConfig> {
        vec![self.clone(); max_tasks]
    }
}

fn parse_value<T: FromStr>(key: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T::Err: fmt::Display,
{
    raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        key,
        reason: format!("`{}`: {}", raw, e),
    })
}
