//! Core value model shared by the shardbridge crates
//!
//! Provides the types that travel between callers, connection managers and
//! database providers:
//! - Shard identity (`ShardId`, `ShardKey`, `ShardChild`)
//! - Parameter values and stored-procedure parameter collections
//! - Result sets and the row-to-model mapping cache

pub mod error;
pub mod mapper;
pub mod parameter;
pub mod result;
pub mod shard;
pub mod value;

// Re-export commonly used types
pub use error::MapError;
pub use mapper::{MappedRow, MapperCache, Model};
pub use parameter::{Direction, Parameter, ParameterCollection};
pub use result::{QueryResults, ResultSet, Row};
pub use shard::{ShardChild, ShardId, ShardKey};
pub use value::{DbValue, FromValue};
