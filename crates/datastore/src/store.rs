//! Data-store registry built once from configuration

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use resilience::ResilienceParameters;
use sb_core::MapperCache;
use tracing::{debug, info, warn};

use crate::config::{ConfigError, ConnectionEndpoint, DataStoresConfig};
use crate::connection::ConnectionManager;
use crate::error::{DataError, Result};
use crate::provider::DbProvider;
use crate::shard_set::{ShardDataSet, ShardInstance};

/// Immutable lookup of shard sets and non-sharded databases by name
#[derive(Debug)]
pub struct DataStores {
    shard_sets: HashMap<String, Arc<ShardDataSet>>,
    databases: HashMap<String, Arc<ConnectionManager>>,
    mapper: Arc<MapperCache>,
}

impl DataStores {
    /// Build every connection manager described by `config`
    pub fn build(
        config: &DataStoresConfig,
        provider: Arc<dyn DbProvider>,
    ) -> std::result::Result<Self, ConfigError> {
        Self::with_mapper(config, provider, Arc::new(MapperCache::new()))
    }

    /// Like [`DataStores::build`], sharing an existing mapper cache
    pub fn with_mapper(
        config: &DataStoresConfig,
        provider: Arc<dyn DbProvider>,
        mapper: Arc<MapperCache>,
    ) -> std::result::Result<Self, ConfigError> {
        let manager = |endpoint: ConnectionEndpoint, shard_id| {
            let params = resilience_for(config, &endpoint);
            ConnectionManager::new(endpoint, shard_id, params, provider.clone(), mapper.clone())
        };

        let mut databases = HashMap::with_capacity(config.databases.len());
        for (name, endpoint) in &config.databases {
            let endpoint = endpoint.resolve(name, &config.security)?;
            debug!(
                database = %name,
                target = %endpoint.target,
                description = endpoint.description.as_deref().unwrap_or_default(),
                "Registering database"
            );
            databases.insert(name.clone(), Arc::new(manager(endpoint, None)));
        }

        let mut shard_sets = HashMap::with_capacity(config.shard_sets.len());
        let mut shard_count = 0;
        for (set_name, set) in &config.shard_sets {
            let mut seen = BTreeSet::new();
            let mut instances = Vec::with_capacity(set.shards.len());
            for shard in &set.shards {
                if !seen.insert(shard.shard_id) {
                    return Err(ConfigError::DuplicateShard {
                        shard_set: set_name.clone(),
                        shard_id: shard.shard_id,
                    });
                }
                let read = set.read_endpoint(shard).resolve(
                    &format!("{}/{}/read", set_name, shard.shard_id),
                    &config.security,
                )?;
                let write = set.write_endpoint(shard).resolve(
                    &format!("{}/{}/write", set_name, shard.shard_id),
                    &config.security,
                )?;
                instances.push(ShardInstance {
                    shard_id: shard.shard_id,
                    read: manager(read, Some(shard.shard_id)),
                    write: manager(write, Some(shard.shard_id)),
                });
            }
            shard_count += instances.len();
            shard_sets.insert(
                set_name.clone(),
                Arc::new(ShardDataSet::new(set_name.clone(), instances, set.max_fan_out)),
            );
        }

        info!(
            databases = databases.len(),
            shard_sets = shard_sets.len(),
            shards = shard_count,
            "Data stores built"
        );

        Ok(Self {
            shard_sets,
            databases,
            mapper,
        })
    }

    pub fn shard_set(&self, name: &str) -> Result<Arc<ShardDataSet>> {
        self.shard_sets
            .get(name)
            .cloned()
            .ok_or_else(|| DataError::ShardSetNotFound(name.to_string()))
    }

    pub fn database(&self, name: &str) -> Result<Arc<ConnectionManager>> {
        self.databases
            .get(name)
            .cloned()
            .ok_or_else(|| DataError::DatabaseNotFound(name.to_string()))
    }

    pub fn shard_set_names(&self) -> impl Iterator<Item = &str> {
        self.shard_sets.keys().map(String::as_str)
    }

    pub fn database_names(&self) -> impl Iterator<Item = &str> {
        self.databases.keys().map(String::as_str)
    }

    pub fn mapper(&self) -> &Arc<MapperCache> {
        &self.mapper
    }
}

fn resilience_for(config: &DataStoresConfig, endpoint: &ConnectionEndpoint) -> ResilienceParameters {
    let Some(key) = endpoint.resilience_key.as_deref() else {
        return ResilienceParameters::default();
    };
    match config.resilience.get(key) {
        Some(params) => params.clone(),
        None => {
            warn!(
                endpoint = %endpoint.name,
                key,
                "Resilience key not found, using default parameters"
            );
            ResilienceParameters::default()
        }
    }
}
