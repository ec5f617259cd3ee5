//! Per-connection cache of compiled policies keyed by operation name

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::params::ResilienceParameters;
use crate::policy::{ResiliencePolicy, RetryHook, TransientFn};

/// Lazily compiled policies for one connection
///
/// Every policy shares the connection's parameters, transient classifier and
/// retry hook. Entries live as long as the cache.
pub struct PolicyCache<E> {
    params: ResilienceParameters,
    is_transient: TransientFn<E>,
    on_retry: RetryHook<E>,
    policies: RwLock<HashMap<String, Arc<ResiliencePolicy<E>>>>,
}

impl<E> std::fmt::Debug for PolicyCache<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PolicyCache")
            .field("params", &self.params)
            .field("policies", &self.policies.read().len())
            .finish()
    }
}

impl<E> PolicyCache<E> {
    pub fn new(
        params: ResilienceParameters,
        is_transient: TransientFn<E>,
        on_retry: RetryHook<E>,
    ) -> Self {
        Self {
            params,
            is_transient,
            on_retry,
            policies: RwLock::new(HashMap::new()),
        }
    }

    pub fn parameters(&self) -> &ResilienceParameters {
        &self.params
    }

    /// Policy for `operation`, compiled on first use
    ///
    /// Racing first calls each compile a policy; the first insert wins and
    /// every caller gets that one.
    pub fn get_or_build(&self, operation: &str) -> Arc<ResiliencePolicy<E>> {
        if let Some(policy) = self.policies.read().get(operation) {
            return policy.clone();
        }

        let built = Arc::new(ResiliencePolicy::new(
            operation,
            self.params.clone(),
            self.is_transient.clone(),
            self.on_retry.clone(),
        ));
        self.policies
            .write()
            .entry(operation.to_string())
            .or_insert(built)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.policies.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.policies.read().is_empty()
    }
}
