//! Shard sets and fan-out queries
//!
//! A [`ShardDataSet`] holds the read/write connection pair of every shard in
//! one logical set. Fan-out methods run the same call on each selected shard
//! concurrently, each branch with its own copy of the parameters.

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::pin;

use futures::stream::{self, Stream, StreamExt};
use sb_core::{Model, ParameterCollection, ShardId};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::connection::ConnectionManager;
use crate::error::{DataError, Result};
use crate::handler::ResultHandler;

/// Which shards a fan-out touches
#[derive(Debug, Clone, Copy, Default)]
pub enum ShardFilter<'a> {
    #[default]
    All,
    /// Every shard except these
    Except(&'a [ShardId]),
    /// Only these shards
    Only(&'a [ShardId]),
}

impl ShardFilter<'_> {
    pub fn includes(&self, shard_id: ShardId) -> bool {
        match self {
            ShardFilter::All => true,
            ShardFilter::Except(ids) => !ids.contains(&shard_id),
            ShardFilter::Only(ids) => ids.contains(&shard_id),
        }
    }

    fn named(&self) -> &[ShardId] {
        match self {
            ShardFilter::All => &[],
            ShardFilter::Except(ids) | ShardFilter::Only(ids) => ids,
        }
    }
}

/// The read and write connections of one shard
#[derive(Debug)]
pub struct ShardInstance {
    pub shard_id: ShardId,
    pub read: ConnectionManager,
    pub write: ConnectionManager,
}

/// All shards of one logical shard set
#[derive(Debug)]
pub struct ShardDataSet {
    name: String,
    shards: BTreeMap<ShardId, ShardInstance>,
    max_fan_out: Option<usize>,
}

impl ShardDataSet {
    pub fn new(
        name: impl Into<String>,
        shards: impl IntoIterator<Item = ShardInstance>,
        max_fan_out: Option<usize>,
    ) -> Self {
        Self {
            name: name.into(),
            shards: shards.into_iter().map(|s| (s.shard_id, s)).collect(),
            max_fan_out,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.shards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shards.is_empty()
    }

    /// Shard ids in ascending order
    pub fn shard_ids(&self) -> impl Iterator<Item = ShardId> + '_ {
        self.shards.keys().copied()
    }

    pub fn max_fan_out(&self) -> Option<usize> {
        self.max_fan_out
    }

    /// Direct access to one shard
    pub fn shard(&self, shard_id: ShardId) -> Result<&ShardInstance> {
        self.shards
            .get(&shard_id)
            .ok_or_else(|| DataError::ShardNotFound {
                shard_set: self.name.clone(),
                shard_id,
            })
    }

    /// Read connection of one shard
    pub fn read(&self, shard_id: ShardId) -> Result<&ConnectionManager> {
        self.shard(shard_id).map(|s| &s.read)
    }

    /// Write connection of one shard
    pub fn write(&self, shard_id: ShardId) -> Result<&ConnectionManager> {
        self.shard(shard_id).map(|s| &s.write)
    }

    fn select(&self, filter: ShardFilter<'_>) -> Vec<&ShardInstance> {
        for id in filter.named() {
            if !self.shards.contains_key(id) {
                debug!(shard_set = %self.name, shard_id = id, "Ignoring unknown shard in filter");
            }
        }
        self.shards
            .values()
            .filter(|s| filter.includes(s.shard_id))
            .collect()
    }

    /// Run `branch` for every selected shard, yielding results as they complete
    fn fan_out<'s, T, F, Fut>(
        &'s self,
        filter: ShardFilter<'_>,
        branch: F,
    ) -> impl Stream<Item = Result<T>> + 's
    where
        F: FnMut(&'s ShardInstance) -> Fut + 's,
        Fut: Future<Output = Result<T>> + 's,
        T: 's,
    {
        let selected = self.select(filter);
        let width = self.max_fan_out.unwrap_or(selected.len()).max(1);
        trace!(shard_set = %self.name, shards = selected.len(), width, "Fan-out");
        stream::iter(selected.into_iter().map(branch)).buffer_unordered(width)
    }

    /// First non-empty single-row result across shards
    ///
    /// Branches share a child of `cancel`; the first `Some` cancels the rest.
    /// Cancelled branches are ignored, any other failure ends the race. If
    /// the caller's token fires before a winner, the result is `Cancelled`.
    #[allow(clippy::too_many_arguments)]
    pub async fn query_first<A, M, H>(
        &self,
        operation: &str,
        filter: ShardFilter<'_>,
        params: &ParameterCollection,
        shard_param: Option<usize>,
        handler: &H,
        arg: &A,
        cancel: &CancellationToken,
    ) -> Result<Option<M>>
    where
        H: ResultHandler<A, M> + ?Sized,
    {
        let scope = cancel.child_token();
        let outcome = {
            let scope = &scope;
            let mut results = pin!(self.fan_out(filter, |shard| async move {
                let mut params = params.clone();
                shard
                    .read
                    .query_model(operation, &mut params, shard_param, handler, true, arg, scope)
                    .await
            }));

            let mut outcome = Ok(None);
            while let Some(result) = results.next().await {
                match result {
                    Ok(Some(model)) => {
                        outcome = Ok(Some(model));
                        break;
                    }
                    Ok(None) | Err(DataError::Cancelled) => {}
                    Err(err) => {
                        outcome = Err(err);
                        break;
                    }
                }
            }
            scope.cancel();
            outcome
        };

        match outcome {
            Ok(None) if cancel.is_cancelled() => Err(DataError::Cancelled),
            other => other,
        }
    }

    /// Every non-empty result across shards, in completion order
    ///
    /// Waits for all branches; the first failure is returned once every
    /// branch has settled.
    #[allow(clippy::too_many_arguments)]
    pub async fn query_all<A, M, H>(
        &self,
        operation: &str,
        filter: ShardFilter<'_>,
        params: &ParameterCollection,
        shard_param: Option<usize>,
        handler: &H,
        arg: &A,
        cancel: &CancellationToken,
    ) -> Result<Vec<M>>
    where
        H: ResultHandler<A, M> + ?Sized,
    {
        let results = self.fan_out(filter, |shard| async move {
            let mut params = params.clone();
            shard
                .read
                .query_model(operation, &mut params, shard_param, handler, false, arg, cancel)
                .await
        });
        let models = settle(results).await?;
        Ok(models.into_iter().flatten().collect())
    }

    /// `query_list` on every selected shard, concatenated in completion order
    pub async fn query_all_lists<T: Model>(
        &self,
        operation: &str,
        filter: ShardFilter<'_>,
        params: &ParameterCollection,
        shard_param: Option<usize>,
        cancel: &CancellationToken,
    ) -> Result<Vec<T>> {
        let results = self.fan_out(filter, |shard| async move {
            let mut params = params.clone();
            shard
                .read
                .query_list::<T>(operation, &mut params, shard_param, cancel)
                .await
        });
        let lists = settle(results).await?;
        Ok(lists.into_iter().flatten().collect())
    }

    /// Non-query on every selected shard's write connection
    pub async fn execute_all(
        &self,
        operation: &str,
        filter: ShardFilter<'_>,
        params: &ParameterCollection,
        shard_param: Option<usize>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let results = self.fan_out(filter, |shard| async move {
            let mut params = params.clone();
            shard
                .write
                .execute(operation, &mut params, shard_param, cancel)
                .await
        });
        settle(results).await.map(|_| ())
    }
}

/// Drain every branch, keeping the first failure
async fn settle<T>(results: impl Stream<Item = Result<T>>) -> Result<Vec<T>> {
    let mut results = pin!(results);
    let mut values = Vec::new();
    let mut first_error = None;
    while let Some(result) = results.next().await {
        match result {
            Ok(value) => values.push(value),
            Err(err) => {
                first_error.get_or_insert(err);
            }
        }
    }
    match first_error {
        Some(err) => Err(err),
        None => Ok(values),
    }
}
