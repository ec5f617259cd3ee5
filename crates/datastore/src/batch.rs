//! Multi-statement batches run in one transaction

use async_trait::async_trait;
use sb_core::{MapperCache, ParameterCollection, QueryResults, ShardId};
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::connection::{guard, stamp_shard};
use crate::error::Result;
use crate::provider::{Command, CommandKind, DbConnection};

/// Work executed inside a transaction on one connection
#[async_trait]
pub trait Batch: Send + Sync {
    type Output: Send;

    /// Policy key and log name
    fn name(&self) -> &str;

    async fn run(&self, ctx: &mut BatchContext<'_>) -> Result<Self::Output>;
}

/// Transaction-scoped handle given to a running batch
pub struct BatchContext<'a> {
    pub(crate) conn: &'a mut dyn DbConnection,
    pub(crate) cancel: &'a CancellationToken,
    pub(crate) connection: &'a str,
    pub(crate) shard_id: Option<ShardId>,
    pub(crate) mapper: &'a MapperCache,
}

impl BatchContext<'_> {
    pub fn shard_id(&self) -> Option<ShardId> {
        self.shard_id
    }

    pub fn connection(&self) -> &str {
        self.connection
    }

    pub fn mapper(&self) -> &MapperCache {
        self.mapper
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        self.cancel
    }

    /// Run one statement inside the transaction
    pub async fn execute(
        &mut self,
        procedure: &str,
        kind: CommandKind,
        params: &mut ParameterCollection,
        shard_param: Option<usize>,
    ) -> Result<QueryResults> {
        stamp_shard(params, self.shard_id, shard_param)?;
        let command = Command::new(procedure, kind);
        let results = guard(
            self.cancel,
            procedure,
            self.connection,
            self.conn.execute(&command, params, self.cancel),
        )
        .await?;
        trace!(procedure, connection = self.connection, "batch statement done");
        Ok(results)
    }
}

/// One statement of a [`StatementBatch`]
#[derive(Debug, Clone)]
pub struct BatchStep {
    pub procedure: String,
    pub params: ParameterCollection,
    pub shard_param: Option<usize>,
}

impl BatchStep {
    pub fn new(
        procedure: impl Into<String>,
        params: ParameterCollection,
        shard_param: Option<usize>,
    ) -> Self {
        Self {
            procedure: procedure.into(),
            params,
            shard_param,
        }
    }
}

/// Result of a [`StatementBatch`]
#[derive(Debug, Clone, Default)]
pub struct StatementBatchOutput {
    pub steps_run: usize,
    /// Parameters of the final step after execution
    pub outputs: ParameterCollection,
}

/// Ordered non-query statements executed in one transaction
#[derive(Debug, Clone)]
pub struct StatementBatch {
    name: String,
    steps: Vec<BatchStep>,
}

impl StatementBatch {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            steps: Vec::new(),
        }
    }

    pub fn step(mut self, step: BatchStep) -> Self {
        self.steps.push(step);
        self
    }

    pub fn steps(&self) -> &[BatchStep] {
        &self.steps
    }
}

#[async_trait]
impl Batch for StatementBatch {
    type Output = StatementBatchOutput;

    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, ctx: &mut BatchContext<'_>) -> Result<StatementBatchOutput> {
        let mut output = StatementBatchOutput::default();
        for step in &self.steps {
            let mut params = step.params.clone();
            ctx.execute(
                &step.procedure,
                CommandKind::NonQuery,
                &mut params,
                step.shard_param,
            )
            .await?;
            output.steps_run += 1;
            output.outputs = params;
        }
        Ok(output)
    }
}
