//! Data-store configuration
//!
//! YAML tables for security credentials, resilience parameter sets,
//! non-sharded databases and shard sets. Shard endpoints inherit unset
//! fields from their shard set's read/write defaults.

use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap};

use resilience::ResilienceParameters;
use sb_core::ShardId;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DataStoresConfig {
    /// Security key → credential
    #[serde(default)]
    pub security: HashMap<String, SecurityCredential>,
    /// Resilience key → retry and breaker settings
    #[serde(default)]
    pub resilience: HashMap<String, ResilienceParameters>,
    /// Database name → endpoint
    #[serde(default)]
    pub databases: BTreeMap<String, EndpointConfig>,
    /// Shard-set name → shards
    #[serde(default)]
    pub shard_sets: BTreeMap<String, ShardSetConfig>,
}

impl DataStoresConfig {
    /// Load configuration from YAML file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self, ConfigError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;
        Self::from_yaml(&content)
    }

    /// Load configuration from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(yaml).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Merge with another config (other takes precedence per key)
    pub fn merge(&mut self, other: DataStoresConfig) {
        self.security.extend(other.security);
        self.resilience.extend(other.resilience);
        self.databases.extend(other.databases);
        self.shard_sets.extend(other.shard_sets);
    }
}

/// Login for an endpoint
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct SecurityCredential {
    #[serde(default)]
    pub user_name: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// Use the process identity instead of a user name and password
    #[serde(default)]
    pub integrated: bool,
}

impl std::fmt::Debug for SecurityCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecurityCredential")
            .field("user_name", &self.user_name)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("integrated", &self.integrated)
            .finish()
    }
}

/// Connection settings; every field is optional so shards can inherit
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EndpointConfig {
    #[serde(default)]
    pub data_source: Option<String>,
    #[serde(default)]
    pub database: Option<String>,
    #[serde(default)]
    pub security_key: Option<String>,
    #[serde(default)]
    pub resilience_key: Option<String>,
    #[serde(default)]
    pub application_name: Option<String>,
    #[serde(default)]
    pub connect_timeout_secs: Option<u64>,
    /// Extra `key=value` pairs appended to the connection string
    #[serde(default)]
    pub options: BTreeMap<String, String>,
    #[serde(default)]
    pub description: Option<String>,
}

impl EndpointConfig {
    /// Merge with another endpoint (other takes precedence)
    pub fn merge(&mut self, other: EndpointConfig) {
        if other.data_source.is_some() {
            self.data_source = other.data_source;
        }
        if other.database.is_some() {
            self.database = other.database;
        }
        if other.security_key.is_some() {
            self.security_key = other.security_key;
        }
        if other.resilience_key.is_some() {
            self.resilience_key = other.resilience_key;
        }
        if other.application_name.is_some() {
            self.application_name = other.application_name;
        }
        if other.connect_timeout_secs.is_some() {
            self.connect_timeout_secs = other.connect_timeout_secs;
        }
        if other.description.is_some() {
            self.description = other.description;
        }
        self.options.extend(other.options);
    }

    /// `self` layered over `defaults`
    pub fn inherit(&self, defaults: &EndpointConfig) -> EndpointConfig {
        let mut merged = defaults.clone();
        merged.merge(self.clone());
        merged
    }

    /// Resolve into a connection endpoint named `name`
    pub fn resolve(
        &self,
        name: &str,
        security: &HashMap<String, SecurityCredential>,
    ) -> Result<ConnectionEndpoint, ConfigError> {
        let missing = |field: &'static str| ConfigError::MissingField {
            endpoint: name.to_string(),
            field,
        };
        let data_source = self.data_source.as_deref().ok_or_else(|| missing("data_source"))?;
        let database = self.database.as_deref().ok_or_else(|| missing("database"))?;
        let key = self.security_key.as_deref().ok_or_else(|| missing("security_key"))?;
        let credential = security
            .get(key)
            .ok_or_else(|| ConfigError::MissingSecurityKey {
                endpoint: name.to_string(),
                key: key.to_string(),
            })?;

        let mut parts = vec![
            format!("Data Source={}", quote(data_source)),
            format!("Database={}", quote(database)),
        ];
        if credential.integrated {
            parts.push("Integrated Security=true".to_string());
        } else {
            let user = credential
                .user_name
                .as_deref()
                .ok_or_else(|| ConfigError::InvalidCredential(key.to_string()))?;
            parts.push(format!("User ID={}", quote(user)));
            parts.push(format!(
                "Password={}",
                quote(credential.password.as_deref().unwrap_or(""))
            ));
        }
        if let Some(app) = &self.application_name {
            parts.push(format!("Application Name={}", quote(app)));
        }
        if let Some(timeout) = self.connect_timeout_secs {
            parts.push(format!("Connect Timeout={}", timeout));
        }
        for (k, v) in &self.options {
            if k.is_empty() || k.contains([';', '=', '"', '\'']) {
                return Err(ConfigError::InvalidOptionKey {
                    endpoint: name.to_string(),
                    key: k.clone(),
                });
            }
            parts.push(format!("{}={}", k, quote(v)));
        }

        Ok(ConnectionEndpoint {
            name: name.to_string(),
            target: format!("{}/{}", data_source, database),
            connection_string: parts.join(";"),
            description: self.description.clone(),
            resilience_key: self.resilience_key.clone(),
        })
    }
}

/// Quote a connection-string value when it holds a delimiter
///
/// Quoted values are wrapped in double quotes with embedded quotes doubled.
fn quote(value: &str) -> Cow<'_, str> {
    let needs_quotes = value.contains([';', '=', '"', '\''])
        || value.starts_with(char::is_whitespace)
        || value.ends_with(char::is_whitespace);
    if needs_quotes {
        Cow::Owned(format!("\"{}\"", value.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(value)
    }
}

/// A resolved, immutable endpoint
#[derive(Clone, PartialEq)]
pub struct ConnectionEndpoint {
    /// Logical name used in logs and errors
    pub name: String,
    /// `data_source/database`, safe to log
    pub target: String,
    pub connection_string: String,
    pub description: Option<String>,
    pub resilience_key: Option<String>,
}

impl std::fmt::Debug for ConnectionEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionEndpoint")
            .field("name", &self.name)
            .field("target", &self.target)
            .field("description", &self.description)
            .field("resilience_key", &self.resilience_key)
            .finish()
    }
}

/// One logical shard set
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ShardSetConfig {
    /// Cap on concurrently running fan-out branches; unbounded when unset
    #[serde(default)]
    pub max_fan_out: Option<usize>,
    /// Defaults for every shard's read endpoint
    #[serde(default)]
    pub read: EndpointConfig,
    /// Defaults for every shard's write endpoint
    #[serde(default)]
    pub write: EndpointConfig,
    #[serde(default)]
    pub shards: Vec<ShardConfig>,
}

/// One shard's endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShardConfig {
    pub shard_id: ShardId,
    #[serde(default)]
    pub read: EndpointConfig,
    /// Falls back to `read` when unset
    #[serde(default)]
    pub write: Option<EndpointConfig>,
}

impl ShardSetConfig {
    /// Effective read endpoint config for `shard`
    pub fn read_endpoint(&self, shard: &ShardConfig) -> EndpointConfig {
        shard.read.inherit(&self.read)
    }

    /// Effective write endpoint config for `shard`
    pub fn write_endpoint(&self, shard: &ShardConfig) -> EndpointConfig {
        shard.write.as_ref().unwrap_or(&shard.read).inherit(&self.write)
    }
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),
    #[error("Parse error: {0}")]
    ParseError(String),
    #[error("Security key {key} not found for endpoint {endpoint}")]
    MissingSecurityKey { endpoint: String, key: String },
    #[error("Endpoint {endpoint} has no {field}")]
    MissingField {
        endpoint: String,
        field: &'static str,
    },
    #[error("Credential {0} has neither a user name nor integrated security")]
    InvalidCredential(String),
    #[error("Option key {key:?} on endpoint {endpoint} is not a valid connection-string key")]
    InvalidOptionKey { endpoint: String, key: String },
    #[error("Duplicate shard {shard_id} in shard set {shard_set}")]
    DuplicateShard { shard_set: String, shard_id: ShardId },
}
