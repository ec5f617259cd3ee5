//! Shard identity
//!
//! Defines the shard identifier and the compound keys that tag a record with
//! the shard it lives on.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::MapError;
use crate::mapper::MappedRow;
use crate::value::FromValue;

/// Shard ID type
pub type ShardId = i16;

/// Record key qualified by the shard that owns it
///
/// Ordering is by shard first, then record, so sorted keys group by shard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ShardKey<R> {
    /// Owning shard
    pub shard_id: ShardId,
    /// Record identifier within the shard
    pub record_id: R,
}

impl<R> ShardKey<R> {
    /// Create a new ShardKey
    pub fn new(shard_id: ShardId, record_id: R) -> Self {
        Self {
            shard_id,
            record_id,
        }
    }

    /// Qualify a child record under this key
    pub fn child<C>(self, child_id: C) -> ShardChild<R, C> {
        ShardChild {
            key: self,
            child_id,
        }
    }
}

impl<R: FromValue> ShardKey<R> {
    /// Build a key from the record column of a mapped row
    ///
    /// The shard id comes from the connection that produced the row, not from
    /// the row itself.
    pub fn from_row(shard_id: ShardId, row: &MappedRow<'_>, column: &str) -> Result<Self, MapError> {
        Ok(Self::new(shard_id, row.get(column)?))
    }
}

impl<R: fmt::Display> fmt::Display for ShardKey<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.shard_id, self.record_id)
    }
}

/// Child record key: a parent ShardKey plus a child identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ShardChild<R, C> {
    /// Parent key
    pub key: ShardKey<R>,
    /// Child identifier within the parent record
    pub child_id: C,
}

impl<R, C> ShardChild<R, C> {
    pub fn new(shard_id: ShardId, record_id: R, child_id: C) -> Self {
        ShardKey::new(shard_id, record_id).child(child_id)
    }

    pub fn shard_id(&self) -> ShardId {
        self.key.shard_id
    }
}

impl<R: fmt::Display, C: fmt::Display> fmt::Display for ShardChild<R, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.key, self.child_id)
    }
}
