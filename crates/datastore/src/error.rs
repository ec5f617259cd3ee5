//! Data-access errors

use std::time::Duration;

use resilience::PolicyError;
use sb_core::{MapError, ShardId};
use thiserror::Error;

use crate::config::ConfigError;
use crate::provider::ProviderError;

/// Result alias for data-access operations
pub type Result<T> = std::result::Result<T, DataError>;

/// Errors surfaced by connection managers, shard sets and the registry
#[derive(Debug, Error)]
pub enum DataError {
    #[error("{operation} on {connection} failed: {source}")]
    Provider {
        operation: String,
        connection: String,
        source: ProviderError,
    },
    #[error("{operation} on {connection} failed after {attempts} attempts: {source}")]
    RetriesExhausted {
        operation: String,
        connection: String,
        attempts: u32,
        source: ProviderError,
    },
    #[error("Circuit open for {operation} on {connection}, retry after {retry_after:?}")]
    CircuitOpen {
        operation: String,
        connection: String,
        retry_after: Duration,
    },
    #[error("Unexpected result from {operation} on {connection}: {message}")]
    UnexpectedResult {
        operation: String,
        connection: String,
        message: String,
    },
    #[error("Mapping error: {0}")]
    Mapping(#[from] MapError),
    #[error("Operation cancelled")]
    Cancelled,
    #[error("Shard not found: {shard_id} in shard set {shard_set}")]
    ShardNotFound { shard_set: String, shard_id: ShardId },
    #[error("Shard set not found: {0}")]
    ShardSetNotFound(String),
    #[error("Database not found: {0}")]
    DatabaseNotFound(String),
    #[error("Shard parameter position {position} out of range for {len} parameters")]
    ShardParameterOutOfRange { position: usize, len: usize },
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl DataError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, DataError::Cancelled)
    }

    /// Provider error behind this failure, if any
    pub fn provider_error(&self) -> Option<&ProviderError> {
        match self {
            DataError::Provider { source, .. } | DataError::RetriesExhausted { source, .. } => {
                Some(source)
            }
            _ => None,
        }
    }

    pub(crate) fn unexpected(operation: &str, connection: &str, message: impl Into<String>) -> Self {
        DataError::UnexpectedResult {
            operation: operation.to_string(),
            connection: connection.to_string(),
            message: message.into(),
        }
    }

    /// Flatten a policy outcome into a data error
    pub(crate) fn from_policy(err: PolicyError<DataError>, operation: &str, connection: &str) -> Self {
        match err {
            PolicyError::Rejected(source) => source,
            PolicyError::Exhausted {
                attempts,
                source: DataError::Provider { source, .. },
            } => DataError::RetriesExhausted {
                operation: operation.to_string(),
                connection: connection.to_string(),
                attempts,
                source,
            },
            PolicyError::Exhausted { source, .. } => source,
            PolicyError::CircuitOpen { retry_after } => DataError::CircuitOpen {
                operation: operation.to_string(),
                connection: connection.to_string(),
                retry_after,
            },
            PolicyError::Cancelled => DataError::Cancelled,
        }
    }
}
