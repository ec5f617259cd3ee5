//! Connection manager
//!
//! One logical connection: a shard's read or write endpoint, or a non-sharded
//! database. Every call goes through the policy compiled for its operation
//! name and opens a fresh physical connection per attempt.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use resilience::{PolicyCache, ResilienceParameters, RetryEvent, RetryHook, TransientFn};
use sb_core::{FromValue, MapError, MapperCache, Model, ParameterCollection, QueryResults, ShardId};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace, warn};

use crate::batch::{Batch, BatchContext};
use crate::config::ConnectionEndpoint;
use crate::error::{DataError, Result};
use crate::handler::{HandlerContext, ResultHandler};
use crate::provider::{Command, CommandKind, DbProvider, ProviderError};

/// Await a provider call unless the token fires first
///
/// The token is re-checked after the call so a result racing a
/// cancellation still reports `Cancelled`.
pub(crate) async fn guard<T>(
    cancel: &CancellationToken,
    operation: &str,
    connection: &str,
    fut: impl Future<Output = std::result::Result<T, ProviderError>>,
) -> Result<T> {
    let result = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(DataError::Cancelled),
        result = fut => result,
    };
    if cancel.is_cancelled() {
        return Err(DataError::Cancelled);
    }
    result.map_err(|source| DataError::Provider {
        operation: operation.to_string(),
        connection: connection.to_string(),
        source,
    })
}

/// Write the connection's shard id into the designated parameter
pub(crate) fn stamp_shard(
    params: &mut ParameterCollection,
    shard_id: Option<ShardId>,
    shard_param: Option<usize>,
) -> Result<()> {
    let (Some(position), Some(shard_id)) = (shard_param, shard_id) else {
        return Ok(());
    };
    if params.stamp_shard(position, shard_id) {
        Ok(())
    } else {
        Err(DataError::ShardParameterOutOfRange {
            position,
            len: params.len(),
        })
    }
}

/// Policy-wrapped access to one endpoint
pub struct ConnectionManager {
    name: String,
    target: String,
    description: Option<String>,
    shard_id: Option<ShardId>,
    connection_string: String,
    provider: Arc<dyn DbProvider>,
    mapper: Arc<MapperCache>,
    policies: PolicyCache<DataError>,
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("name", &self.name)
            .field("target", &self.target)
            .field("description", &self.description)
            .field("shard_id", &self.shard_id)
            .field("policies", &self.policies)
            .finish()
    }
}

impl ConnectionManager {
    pub fn new(
        endpoint: ConnectionEndpoint,
        shard_id: Option<ShardId>,
        resilience: ResilienceParameters,
        provider: Arc<dyn DbProvider>,
        mapper: Arc<MapperCache>,
    ) -> Self {
        let classifier = provider.clone();
        let is_transient: TransientFn<DataError> = Arc::new(move |err: &DataError| match err {
            DataError::Provider { source, .. } => classifier.is_transient(source),
            _ => false,
        });

        let connection = endpoint.name.clone();
        let on_retry: RetryHook<DataError> = Arc::new(move |event: &RetryEvent<'_, DataError>| {
            warn!(
                operation = event.name,
                connection = %connection,
                attempt = event.attempt,
                delay_ms = event.delay.as_millis() as u64,
                error = %event.error,
                "Transient failure, retrying"
            );
        });

        Self {
            name: endpoint.name,
            target: endpoint.target,
            description: endpoint.description,
            shard_id,
            connection_string: endpoint.connection_string,
            provider,
            mapper,
            policies: PolicyCache::new(resilience, is_transient, on_retry),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// `data_source/database` of the endpoint
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Free-form description from configuration
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn shard_id(&self) -> Option<ShardId> {
        self.shard_id
    }

    pub fn policies(&self) -> &PolicyCache<DataError> {
        &self.policies
    }

    /// Single value from the return-value or first output parameter
    ///
    /// Integer-like targets prefer a non-null return value; otherwise the
    /// first output or input-output parameter is converted.
    pub async fn lookup_scalar<T: FromValue>(
        &self,
        operation: &str,
        params: &mut ParameterCollection,
        shard_param: Option<usize>,
        cancel: &CancellationToken,
    ) -> Result<T> {
        self.run(
            operation,
            CommandKind::NonQuery,
            params,
            shard_param,
            cancel,
            |_, outputs| self.scalar_from(operation, outputs),
        )
        .await
    }

    fn scalar_from<T: FromValue>(&self, operation: &str, outputs: &ParameterCollection) -> Result<T> {
        if T::INTEGER_LIKE {
            if let Some(ret) = outputs.return_value().filter(|p| !p.value.is_null()) {
                return Ok(T::from_value(&ret.value)?);
            }
        }
        let Some(output) = outputs.first_output() else {
            return Err(DataError::unexpected(
                operation,
                &self.name,
                "no return value or output parameter",
            ));
        };
        T::from_value(&output.value).map_err(|err| match err {
            MapError::UnexpectedNull(_) => DataError::unexpected(
                operation,
                &self.name,
                format!("output parameter {} is null", output.name),
            ),
            other => other.into(),
        })
    }

    /// Every row of the first result set
    pub async fn query_list<T: Model>(
        &self,
        operation: &str,
        params: &mut ParameterCollection,
        shard_param: Option<usize>,
        cancel: &CancellationToken,
    ) -> Result<Vec<T>> {
        self.run(
            operation,
            CommandKind::Reader,
            params,
            shard_param,
            cancel,
            |mut results, _| Ok(results.next_list::<T>(&self.mapper)?),
        )
        .await
    }

    /// One model built by `handler` from every result set
    #[allow(clippy::too_many_arguments)]
    pub async fn query_model<A, M, H>(
        &self,
        operation: &str,
        params: &mut ParameterCollection,
        shard_param: Option<usize>,
        handler: &H,
        single_row: bool,
        arg: &A,
        cancel: &CancellationToken,
    ) -> Result<Option<M>>
    where
        H: ResultHandler<A, M> + ?Sized,
    {
        let kind = if single_row {
            CommandKind::SingleRow
        } else {
            CommandKind::Reader
        };
        self.run(
            operation,
            kind,
            params,
            shard_param,
            cancel,
            |mut results, outputs| {
                let ctx = HandlerContext {
                    shard_id: self.shard_id,
                    operation,
                    connection: &self.name,
                    arg,
                    outputs,
                    mapper: &self.mapper,
                };
                handler.handle(&ctx, &mut results)
            },
        )
        .await
    }

    /// Non-query with no result
    pub async fn execute(
        &self,
        operation: &str,
        params: &mut ParameterCollection,
        shard_param: Option<usize>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        self.run(
            operation,
            CommandKind::NonQuery,
            params,
            shard_param,
            cancel,
            |_, _| Ok(()),
        )
        .await
    }

    /// Run `batch` in one transaction; rolled back on any failure
    ///
    /// Cancellation included: the transaction observes the token through its
    /// provider calls and still rolls back before the call returns.
    pub async fn execute_batch<B: Batch>(
        &self,
        batch: &B,
        cancel: &CancellationToken,
    ) -> Result<B::Output> {
        let operation = batch.name();
        let policy = self.policies.get_or_build(operation);
        let started = Instant::now();

        let outcome = policy
            .execute_cooperative(cancel, |_| self.transaction(batch, operation, cancel))
            .await;

        self.finish(operation, started, outcome)
    }

    async fn transaction<B: Batch>(
        &self,
        batch: &B,
        operation: &str,
        cancel: &CancellationToken,
    ) -> Result<B::Output> {
        let mut conn = guard(
            cancel,
            operation,
            &self.name,
            self.provider.open(&self.connection_string, cancel),
        )
        .await?;
        guard(cancel, operation, &self.name, conn.begin(cancel)).await?;

        let ran = {
            let mut ctx = BatchContext {
                conn: conn.as_mut(),
                cancel,
                connection: &self.name,
                shard_id: self.shard_id,
                mapper: &self.mapper,
            };
            batch.run(&mut ctx).await
        };
        let outcome = match ran {
            Ok(output) => guard(cancel, operation, &self.name, conn.commit(cancel))
                .await
                .map(|_| output),
            Err(err) => Err(err),
        };

        if let Err(err) = &outcome {
            debug!(operation, connection = %self.name, error = %err, "Rolling back batch");
            if let Err(rollback) = conn.rollback().await {
                warn!(
                    operation,
                    connection = %self.name,
                    error = %rollback,
                    "Rollback failed"
                );
            }
        }
        outcome
    }

    async fn run<R, F>(
        &self,
        operation: &str,
        kind: CommandKind,
        params: &mut ParameterCollection,
        shard_param: Option<usize>,
        cancel: &CancellationToken,
        read: F,
    ) -> Result<R>
    where
        F: Fn(QueryResults, &ParameterCollection) -> Result<R>,
    {
        stamp_shard(params, self.shard_id, shard_param)?;
        let policy = self.policies.get_or_build(operation);
        let command = Command::new(operation, kind);
        let started = Instant::now();

        let outcome = policy
            .execute(cancel, |_| {
                let mut attempt_params = params.clone();
                let command = &command;
                let read = &read;
                async move {
                    let mut conn = guard(
                        cancel,
                        operation,
                        &self.name,
                        self.provider.open(&self.connection_string, cancel),
                    )
                    .await?;
                    let results = guard(
                        cancel,
                        operation,
                        &self.name,
                        conn.execute(command, &mut attempt_params, cancel),
                    )
                    .await?;
                    let value = read(results, &attempt_params)?;
                    if cancel.is_cancelled() {
                        return Err(DataError::Cancelled);
                    }
                    Ok((value, attempt_params))
                }
            })
            .await;

        let (value, executed) = self.finish(operation, started, outcome)?;
        params.copy_outputs_from(&executed);
        Ok(value)
    }

    fn finish<T>(
        &self,
        operation: &str,
        started: Instant,
        outcome: std::result::Result<T, resilience::PolicyError<DataError>>,
    ) -> Result<T> {
        let elapsed_ms = started.elapsed().as_millis() as u64;
        match outcome {
            Ok(value) => {
                trace!(operation, connection = %self.name, elapsed_ms, "Operation completed");
                Ok(value)
            }
            Err(err) => {
                let err = DataError::from_policy(err, operation, &self.name);
                if err.is_cancelled() {
                    debug!(operation, connection = %self.name, elapsed_ms, "Operation cancelled");
                } else {
                    error!(
                        operation,
                        connection = %self.name,
                        description = self.description.as_deref().unwrap_or_default(),
                        elapsed_ms,
                        error = %err,
                        "Operation failed"
                    );
                }
                Err(err)
            }
        }
    }
}
