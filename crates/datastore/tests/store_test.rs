mod common;

use common::config_yaml;
use common::mock_provider::MockProvider;
use shardbridge::{ConfigError, DataError, DataStores, DataStoresConfig};

#[test]
fn test_build_registers_everything() {
    let _ = tracing_subscriber::fmt::try_init();
    let config = DataStoresConfig::from_yaml(&config_yaml(&[1, 2, 3], Some(2))).unwrap();
    let stores = DataStores::build(&config, MockProvider::new()).unwrap();

    let mut databases: Vec<&str> = stores.database_names().collect();
    databases.sort();
    assert_eq!(databases, vec!["catalog", "ledger"]);

    let widgets = stores.shard_set("widgets").unwrap();
    assert_eq!(widgets.len(), 3);
    let shard = widgets.shard(2).unwrap();
    assert_eq!(shard.read.name(), "widgets/2/read");
    assert_eq!(shard.read.target(), "s2/widgets");
    assert_eq!(shard.write.target(), "s2w/widgets");
    assert_eq!(shard.read.shard_id(), Some(2));
    assert_eq!(shard.read.policies().parameters().retry_count, 2);

    let catalog = stores.database("catalog").unwrap();
    assert_eq!(catalog.shard_id(), None);
}

#[test]
fn test_lookups_not_found() {
    let config = DataStoresConfig::from_yaml(&config_yaml(&[1], None)).unwrap();
    let stores = DataStores::build(&config, MockProvider::new()).unwrap();

    assert!(matches!(
        stores.shard_set("gadgets"),
        Err(DataError::ShardSetNotFound(name)) if name == "gadgets"
    ));
    assert!(matches!(
        stores.database("archive"),
        Err(DataError::DatabaseNotFound(name)) if name == "archive"
    ));
}

#[test]
fn test_missing_security_key_is_fatal() {
    let yaml = r#"
databases:
  catalog: { data_source: db1, database: catalog, security_key: nobody }
"#;
    let config = DataStoresConfig::from_yaml(yaml).unwrap();
    let err = DataStores::build(&config, MockProvider::new()).unwrap_err();
    match err {
        ConfigError::MissingSecurityKey { endpoint, key } => {
            assert_eq!(endpoint, "catalog");
            assert_eq!(key, "nobody");
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_missing_resilience_key_uses_defaults() {
    let _ = tracing_subscriber::fmt::try_init();
    let yaml = r#"
security:
  app: { user_name: app, password: pw }
databases:
  catalog: { data_source: db1, database: catalog, security_key: app, resilience_key: missing }
"#;
    let config = DataStoresConfig::from_yaml(yaml).unwrap();
    let stores = DataStores::build(&config, MockProvider::new()).unwrap();
    let catalog = stores.database("catalog").unwrap();
    let params = catalog.policies().parameters();
    assert_eq!(params.retry_count, 6);
    assert_eq!(params.circuit_breaker_failure_threshold, 20);
}

#[test]
fn test_duplicate_shard_rejected() {
    let yaml = r#"
security:
  app: { user_name: app }
shard_sets:
  widgets:
    read: { database: widgets, security_key: app }
    write: { database: widgets, security_key: app }
    shards:
      - shard_id: 1
        read: { data_source: s1 }
      - shard_id: 1
        read: { data_source: s1b }
"#;
    let config = DataStoresConfig::from_yaml(yaml).unwrap();
    let err = DataStores::build(&config, MockProvider::new()).unwrap_err();
    assert!(matches!(
        err,
        ConfigError::DuplicateShard { shard_id: 1, .. }
    ));
}

#[test]
fn test_config_merge_overrides_by_name() {
    let mut base = DataStoresConfig::from_yaml(&config_yaml(&[1], None)).unwrap();
    let overlay = DataStoresConfig::from_yaml(
        r#"
databases:
  catalog: { data_source: catalog-dr, database: main, security_key: app }
"#,
    )
    .unwrap();
    base.merge(overlay);
    let stores = DataStores::build(&base, MockProvider::new()).unwrap();
    assert_eq!(stores.database("catalog").unwrap().target(), "catalog-dr/main");
    assert!(stores.database("ledger").is_ok());
}

#[test]
fn test_description_reaches_manager() {
    let yaml = r#"
security:
  app: { user_name: app, password: pw }
databases:
  catalog: { data_source: db1, database: catalog, security_key: app, description: "Product catalog" }
  ledger: { data_source: db2, database: ledger, security_key: app }
"#;
    let config = DataStoresConfig::from_yaml(yaml).unwrap();
    let stores = DataStores::build(&config, MockProvider::new()).unwrap();
    let catalog = stores.database("catalog").unwrap();
    assert_eq!(catalog.description(), Some("Product catalog"));
    assert!(format!("{:?}", catalog).contains("Product catalog"));
    assert_eq!(stores.database("ledger").unwrap().description(), None);
}
