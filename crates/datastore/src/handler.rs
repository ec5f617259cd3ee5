//! Custom result handlers

use std::marker::PhantomData;

use sb_core::{MapperCache, Model, ParameterCollection, QueryResults, ShardId};

use crate::error::Result;

/// What a handler knows about the call that produced its results
#[derive(Debug)]
pub struct HandlerContext<'a, A> {
    /// Shard of the connection, `None` for a non-sharded database
    pub shard_id: Option<ShardId>,
    pub operation: &'a str,
    pub connection: &'a str,
    /// Caller-supplied argument
    pub arg: &'a A,
    /// Parameters after execution, including outputs
    pub outputs: &'a ParameterCollection,
    pub mapper: &'a MapperCache,
}

/// Materializes one model from a command's result sets
pub trait ResultHandler<A, M>: Send + Sync {
    fn handle(&self, ctx: &HandlerContext<'_, A>, results: &mut QueryResults) -> Result<Option<M>>;
}

impl<A, M, F> ResultHandler<A, M> for F
where
    F: Fn(&HandlerContext<'_, A>, &mut QueryResults) -> Result<Option<M>> + Send + Sync,
{
    fn handle(&self, ctx: &HandlerContext<'_, A>, results: &mut QueryResults) -> Result<Option<M>> {
        self(ctx, results)
    }
}

/// Pin a closure to the handler signature so its argument types are inferred
pub fn handler<A, M, F>(f: F) -> F
where
    F: Fn(&HandlerContext<'_, A>, &mut QueryResults) -> Result<Option<M>> + Send + Sync,
{
    f
}

/// Maps the first row of the first result set
pub struct FirstRow<M>(PhantomData<fn() -> M>);

impl<M> FirstRow<M> {
    pub fn new() -> Self {
        Self(PhantomData)
    }
}

impl<M> Default for FirstRow<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A, M: Model> ResultHandler<A, M> for FirstRow<M> {
    fn handle(&self, ctx: &HandlerContext<'_, A>, results: &mut QueryResults) -> Result<Option<M>> {
        Ok(results.next_single(ctx.mapper)?)
    }
}
