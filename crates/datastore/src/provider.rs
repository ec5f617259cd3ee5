//! Database provider boundary
//!
//! A provider opens physical connections and classifies its own errors as
//! transient or not. Connection pooling, wire protocols and driver specifics
//! live behind these traits.

use async_trait::async_trait;
use sb_core::{ParameterCollection, QueryResults};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Error reported by a provider
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Provider error {code}: {message}")]
pub struct ProviderError {
    /// Provider-specific error number
    pub code: i32,
    pub message: String,
}

impl ProviderError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// How a command's results are consumed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    /// No result sets expected
    NonQuery,
    /// One or more result sets
    Reader,
    /// Only the first row of the first result set is needed
    SingleRow,
}

/// A stored-procedure invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub procedure: String,
    pub kind: CommandKind,
}

impl Command {
    pub fn new(procedure: impl Into<String>, kind: CommandKind) -> Self {
        Self {
            procedure: procedure.into(),
            kind,
        }
    }
}

/// An open physical connection
#[async_trait]
pub trait DbConnection: Send {
    /// Run `command`; output and return-value parameters are written into `params`
    async fn execute(
        &mut self,
        command: &Command,
        params: &mut ParameterCollection,
        cancel: &CancellationToken,
    ) -> Result<QueryResults, ProviderError>;

    async fn begin(&mut self, cancel: &CancellationToken) -> Result<(), ProviderError>;

    async fn commit(&mut self, cancel: &CancellationToken) -> Result<(), ProviderError>;

    async fn rollback(&mut self) -> Result<(), ProviderError>;
}

/// Connection factory and error classifier for one database engine
#[async_trait]
pub trait DbProvider: Send + Sync {
    async fn open(
        &self,
        connection_string: &str,
        cancel: &CancellationToken,
    ) -> Result<Box<dyn DbConnection>, ProviderError>;

    /// Whether retrying the failed call may succeed
    fn is_transient(&self, error: &ProviderError) -> bool;
}
