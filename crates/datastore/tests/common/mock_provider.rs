//! Scripted in-memory provider
//!
//! Connections are identified by the `Data Source` of their connection
//! string. Each (data source, procedure) pair follows a scripted
//! [`Behavior`]; every execute call is recorded with the parameters and the
//! cancellation token it received.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use shardbridge::{
    Command, CommandKind, DbConnection, DbProvider, DbValue, ParameterCollection, ProviderError,
    QueryResults, ResultSet,
};
use tokio_util::sync::CancellationToken;

/// Error codes the mock treats as transient
pub const TRANSIENT_CODES: &[i32] = &[1205, -2];

pub fn deadlock() -> ProviderError {
    ProviderError::new(1205, "deadlock victim")
}

pub fn constraint_violation() -> ProviderError {
    ProviderError::new(547, "constraint violation")
}

#[derive(Debug, Clone)]
pub enum Behavior {
    /// Return these result sets and write these output values
    Reply {
        results: Vec<ResultSet>,
        outputs: Vec<(String, DbValue)>,
    },
    Fail(ProviderError),
    /// Fail the first `failures` attempts, then behave as `then`
    FailThen {
        failures: u32,
        error: ProviderError,
        then: Box<Behavior>,
    },
    /// Sleep, then behave as the inner behavior
    Delay(Duration, Box<Behavior>),
    /// Block until the token handed to execute is cancelled
    Hang,
}

impl Behavior {
    pub fn rows(set: ResultSet) -> Self {
        Behavior::Reply {
            results: vec![set],
            outputs: Vec::new(),
        }
    }

    pub fn outputs(outputs: Vec<(&str, DbValue)>) -> Self {
        Behavior::Reply {
            results: Vec::new(),
            outputs: outputs
                .into_iter()
                .map(|(name, value)| (name.to_string(), value))
                .collect(),
        }
    }

    pub fn empty() -> Self {
        Behavior::Reply {
            results: Vec::new(),
            outputs: Vec::new(),
        }
    }
}

/// One recorded execute call
#[derive(Debug, Clone)]
pub struct Recorded {
    pub data_source: String,
    pub procedure: String,
    pub kind: CommandKind,
    /// Parameters as handed to the provider
    pub params: ParameterCollection,
    pub token: CancellationToken,
}

#[derive(Default)]
struct MockState {
    scripts: Mutex<HashMap<(String, String), Behavior>>,
    attempts: Mutex<HashMap<(String, String), u32>>,
    calls: Mutex<Vec<Recorded>>,
    tx_log: Mutex<Vec<(String, &'static str)>>,
    open_failures: Mutex<HashMap<String, ProviderError>>,
    opened: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

#[derive(Default)]
pub struct MockProvider {
    state: Arc<MockState>,
}

impl MockProvider {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn script(&self, data_source: &str, procedure: &str, behavior: Behavior) {
        self.state
            .scripts
            .lock()
            .insert((data_source.to_string(), procedure.to_string()), behavior);
    }

    pub fn fail_open(&self, data_source: &str, error: ProviderError) {
        self.state
            .open_failures
            .lock()
            .insert(data_source.to_string(), error);
    }

    pub fn calls(&self) -> Vec<Recorded> {
        self.state.calls.lock().clone()
    }

    pub fn calls_to(&self, procedure: &str) -> Vec<Recorded> {
        self.calls()
            .into_iter()
            .filter(|c| c.procedure == procedure)
            .collect()
    }

    /// (data source, "begin" | "commit" | "rollback") in order
    pub fn tx_log(&self) -> Vec<(String, &'static str)> {
        self.state.tx_log.lock().clone()
    }

    pub fn opened(&self) -> usize {
        self.state.opened.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.state.max_in_flight.load(Ordering::SeqCst)
    }
}

fn data_source(connection_string: &str) -> String {
    connection_string
        .split(';')
        .find_map(|part| part.strip_prefix("Data Source="))
        .unwrap_or_default()
        .to_string()
}

#[async_trait]
impl DbProvider for MockProvider {
    async fn open(
        &self,
        connection_string: &str,
        _cancel: &CancellationToken,
    ) -> Result<Box<dyn DbConnection>, ProviderError> {
        let data_source = data_source(connection_string);
        if let Some(err) = self.state.open_failures.lock().get(&data_source) {
            return Err(err.clone());
        }
        self.state.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockConnection {
            data_source,
            state: self.state.clone(),
        }))
    }

    fn is_transient(&self, error: &ProviderError) -> bool {
        TRANSIENT_CODES.contains(&error.code)
    }
}

struct MockConnection {
    data_source: String,
    state: Arc<MockState>,
}

struct InFlight<'a>(&'a MockState);

impl<'a> InFlight<'a> {
    fn enter(state: &'a MockState) -> Self {
        let now = state.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        state.max_in_flight.fetch_max(now, Ordering::SeqCst);
        Self(state)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl DbConnection for MockConnection {
    async fn execute(
        &mut self,
        command: &Command,
        params: &mut ParameterCollection,
        cancel: &CancellationToken,
    ) -> Result<QueryResults, ProviderError> {
        let key = (self.data_source.clone(), command.procedure.clone());
        self.state.calls.lock().push(Recorded {
            data_source: self.data_source.clone(),
            procedure: command.procedure.clone(),
            kind: command.kind,
            params: params.clone(),
            token: cancel.clone(),
        });
        let attempt = {
            let mut attempts = self.state.attempts.lock();
            let n = attempts.entry(key.clone()).or_insert(0);
            *n += 1;
            *n
        };
        let mut behavior = self
            .state
            .scripts
            .lock()
            .get(&key)
            .cloned()
            .unwrap_or_else(Behavior::empty);

        let _in_flight = InFlight::enter(&self.state);
        loop {
            behavior = match behavior {
                Behavior::FailThen {
                    failures,
                    error,
                    then,
                } => {
                    if attempt <= failures {
                        return Err(error);
                    }
                    *then
                }
                Behavior::Delay(delay, then) => {
                    tokio::time::sleep(delay).await;
                    *then
                }
                Behavior::Hang => {
                    cancel.cancelled().await;
                    return Err(ProviderError::new(-1, "operation cancelled by user"));
                }
                Behavior::Fail(error) => return Err(error),
                Behavior::Reply { results, outputs } => {
                    for (name, value) in outputs {
                        if let Some(position) = params.position(&name) {
                            params.set_value(position, value);
                        }
                    }
                    return Ok(results.into_iter().collect());
                }
            };
        }
    }

    async fn begin(&mut self, _cancel: &CancellationToken) -> Result<(), ProviderError> {
        self.state
            .tx_log
            .lock()
            .push((self.data_source.clone(), "begin"));
        Ok(())
    }

    async fn commit(&mut self, _cancel: &CancellationToken) -> Result<(), ProviderError> {
        self.state
            .tx_log
            .lock()
            .push((self.data_source.clone(), "commit"));
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), ProviderError> {
        self.state
            .tx_log
            .lock()
            .push((self.data_source.clone(), "rollback"));
        Ok(())
    }
}
