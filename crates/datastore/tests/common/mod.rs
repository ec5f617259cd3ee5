#![allow(dead_code)]

pub mod mock_provider;

use std::sync::Arc;

use shardbridge::{
    DataStores, DataStoresConfig, DbValue, MapError, MappedRow, Model, ResultSet, Row, ShardId,
};

use mock_provider::MockProvider;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Widget {
    pub id: i32,
    pub name: String,
}

impl Model for Widget {
    const COLUMNS: &'static [&'static str] = &["Id", "Name"];

    fn from_row(row: &MappedRow<'_>) -> Result<Self, MapError> {
        Ok(Widget {
            id: row.get("Id")?,
            name: row.get("Name")?,
        })
    }
}

pub fn widget(id: i32) -> Widget {
    Widget {
        id,
        name: format!("widget-{}", id),
    }
}

/// Result set with one row per widget id
pub fn widget_rows(ids: &[i32]) -> ResultSet {
    ResultSet::new(
        ["Id", "Name"],
        ids.iter()
            .map(|id| Row::new(vec![DbValue::Int(*id), DbValue::Text(format!("widget-{}", id))]))
            .collect(),
    )
}

/// Config with a `widgets` shard set over `shards` and two databases
///
/// Shard `n` reads from data source `s{n}` and writes to `s{n}w`.
/// `catalog` retries twice with no breaker; `ledger` never retries and opens
/// its breaker after two failures.
pub fn config_yaml(shards: &[ShardId], max_fan_out: Option<usize>) -> String {
    let mut yaml = String::from(
        r#"
security:
  app: { user_name: app, password: pw }
resilience:
  quick:
    retry_count: 2
    backoff: { kind: fixed, delay_ms: 1 }
    circuit_breaker_failure_threshold: 0
  brittle:
    retry_count: 0
    circuit_breaker_failure_threshold: 2
    circuit_breaker_open_ms: 60000
databases:
  catalog: { data_source: catalog, database: main, security_key: app, resilience_key: quick }
  ledger: { data_source: ledger, database: main, security_key: app, resilience_key: brittle }
shard_sets:
  widgets:
"#,
    );
    if let Some(width) = max_fan_out {
        yaml.push_str(&format!("    max_fan_out: {}\n", width));
    }
    yaml.push_str(
        "    read: { database: widgets, security_key: app, resilience_key: quick }\n    write: { database: widgets, security_key: app, resilience_key: quick }\n    shards:\n",
    );
    for id in shards {
        yaml.push_str(&format!(
            "      - shard_id: {id}\n        read: {{ data_source: s{id} }}\n        write: {{ data_source: s{id}w }}\n",
            id = id
        ));
    }
    yaml
}

pub fn stores(shards: &[ShardId]) -> (Arc<MockProvider>, DataStores) {
    stores_with_fan_out(shards, None)
}

pub fn stores_with_fan_out(
    shards: &[ShardId],
    max_fan_out: Option<usize>,
) -> (Arc<MockProvider>, DataStores) {
    let _ = tracing_subscriber::fmt::try_init();
    let config = DataStoresConfig::from_yaml(&config_yaml(shards, max_fan_out)).unwrap();
    let provider = MockProvider::new();
    let stores = DataStores::build(&config, provider.clone()).unwrap();
    (provider, stores)
}
