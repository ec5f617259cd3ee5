//! Sharded stored-procedure access layer
//!
//! Routes stored-procedure calls to the shards of a shard set, either to one
//! shard or fanned out to all of them, and wraps every round-trip in a
//! retry/circuit-breaker policy compiled per operation name.
//!
//! - `DataStores`: registry of shard sets and databases built from config
//! - `ShardDataSet`: race (`query_first`) and gather (`query_all`) fan-out
//! - `ConnectionManager`: policy-wrapped calls against one endpoint
//! - `DbProvider` / `DbConnection`: the database driver boundary

pub mod batch;
pub mod config;
pub mod connection;
pub mod error;
pub mod handler;
pub mod provider;
pub mod shard_set;
pub mod store;

pub use batch::{Batch, BatchContext, BatchStep, StatementBatch, StatementBatchOutput};
pub use config::{
    ConfigError, ConnectionEndpoint, DataStoresConfig, EndpointConfig, SecurityCredential,
    ShardConfig, ShardSetConfig,
};
pub use connection::ConnectionManager;
pub use error::{DataError, Result};
pub use handler::{handler, FirstRow, HandlerContext, ResultHandler};
pub use provider::{Command, CommandKind, DbConnection, DbProvider, ProviderError};
pub use shard_set::{ShardDataSet, ShardFilter, ShardInstance};
pub use store::DataStores;

pub use resilience::{CircuitState, ResilienceParameters};
pub use sb_core::{
    DbValue, Direction, FromValue, MapError, MappedRow, MapperCache, Model, Parameter,
    ParameterCollection, QueryResults, ResultSet, Row, ShardChild, ShardId, ShardKey,
};
pub use tokio_util::sync::CancellationToken;
