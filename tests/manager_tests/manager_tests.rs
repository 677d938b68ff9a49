//! Tests for Manager
//!
//! These tests verify:
//! - Materializing a root value into an empty store
//! - Hydrating from a populated store, dropping stale entries
//! - Leaf merges and subtree replacement
//! - Validation, type and not-found failures leave everything untouched
//! - Override topics, including overrides that change
//! - Typed handles and read accessors
//! - Optional sections and empty collections survive a restart

#[path = "../common/mod.rs"]
mod common;

use std::collections::BTreeMap;
use std::sync::Arc;

use cfgsync::{
    Changes, ConfigError, ConfigRoot, Entries, InitMode, KvStore, Manager, ManagerOptions, MemStore, Node, Scalar,
    Section, Sections,
};
use common::{
    database, os, sample_config, sample_entries, Config, DatabaseConfig, DatabaseConfigMap, FlakyStore, OsConfig,
    OsConfigs, ServerConfig,
};
use serde::{Deserialize, Serialize};

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_manager() -> (Arc<FlakyStore>, Manager<Config, Arc<FlakyStore>>) {
    let store = FlakyStore::new();
    let manager = Manager::new(store.clone(), sample_config()).unwrap();
    (store, manager)
}

/// Keys whose value differs between two store snapshots
fn changed_keys(before: &Entries, after: &Entries) -> Vec<String> {
    let mut keys: Vec<String> = before
        .keys()
        .chain(after.keys())
        .filter(|key| before.get(*key) != after.get(*key))
        .cloned()
        .collect();
    keys.sort();
    keys.dedup();
    keys
}

// =============================================================================
// Construction Tests
// =============================================================================

#[test]
fn test_materialize_into_empty_store() {
    let (store, manager) = setup_manager();

    assert_eq!(store.snapshot(), sample_entries());
    assert_eq!(store.transactions(), 1);
    assert_eq!(manager.namespace(), "config");
    assert_eq!(manager.root().unwrap(), sample_config());
}

#[test]
fn test_skip_fields_are_never_persisted() {
    let mut config = sample_config();
    config.system.database.0.get_mut("db1").unwrap().not_save = "secret".to_string();

    let store = FlakyStore::new();
    let manager = Manager::new(store.clone(), config).unwrap();

    assert!(store.snapshot().keys().all(|key| !key.contains("not_save")));
    assert!(manager.topics().iter().all(|topic| !topic.contains("not_save")));
    let db1: DatabaseConfig = manager.get_as("system.database.db1").unwrap();
    assert_eq!(db1.not_save, "");
}

#[test]
fn test_hydrate_from_populated_store() {
    let mut entries = sample_entries();
    entries.insert("config.server.port".to_string(), Scalar::Int(9000));
    entries.insert("config.server.test.name".to_string(), "stale".into());
    entries.insert("other.key".to_string(), "untouched".into());
    let store = FlakyStore::with_entries(entries);

    let manager = Manager::new(store.clone(), Config::default()).unwrap();

    let mut expected = sample_config();
    expected.server.port = 9000;
    assert_eq!(manager.root().unwrap(), expected);

    let stored = store.snapshot();
    assert!(!stored.contains_key("config.server.test.name"));
    assert_eq!(stored.get("other.key"), Some(&Scalar::Str("untouched".to_string())));
    assert_eq!(stored.get("config.server.port"), Some(&Scalar::Int(9000)));
}

#[test]
fn test_hydrate_coerces_stored_strings() {
    let mut entries = sample_entries();
    entries.insert("config.server.port".to_string(), "8082".into());
    let store = FlakyStore::with_entries(entries);

    let manager = Manager::new(store.clone(), Config::default()).unwrap();

    assert_eq!(manager.get("server.port").unwrap(), Node::Scalar(Scalar::Int(8082)));
    assert_eq!(store.get("config.server.port").unwrap(), Scalar::Int(8082));
}

#[test]
fn test_hydrate_rejects_uncoercible_entry() {
    let mut entries = sample_entries();
    entries.insert("config.server.port".to_string(), "eighty".into());
    let store = FlakyStore::with_entries(entries);

    let err = Manager::new(store, Config::default()).unwrap_err();
    assert!(matches!(err, ConfigError::TypeMismatch { ref topic, .. } if topic == "server.port"));
}

#[test]
fn test_materialize_mode_overwrites_store() {
    let mut entries = sample_entries();
    entries.insert("config.server.port".to_string(), Scalar::Int(1));
    entries.insert("config.system.database.db9.port".to_string(), Scalar::Int(2));
    let store = FlakyStore::with_entries(entries);

    let options = ManagerOptions::builder().init_mode(InitMode::Materialize).build();
    let manager = Manager::with_options(store.clone(), sample_config(), options).unwrap();

    assert_eq!(manager.root().unwrap(), sample_config());
    assert_eq!(store.snapshot(), sample_entries());
}

#[test]
fn test_custom_namespace() {
    let store = Arc::new(MemStore::new());
    let options = ManagerOptions::builder().namespace("app").build();
    let manager = Manager::with_options(store.clone(), sample_config(), options).unwrap();

    assert_eq!(manager.namespace(), "app");
    assert_eq!(store.get("app.server.port").unwrap(), Scalar::Int(8080));
    assert!(!store.has("config.server.port").unwrap());
}

#[test]
fn test_duplicate_override_fails_construction() {
    let mut config = sample_config();
    config.system.database.0.get_mut("db2").unwrap().name = "db1".to_string();

    let err = Manager::new(MemStore::new(), config).unwrap_err();
    assert!(matches!(err, ConfigError::Schema { .. }));
}

#[test]
fn test_separator_in_map_key_fails_construction() {
    let mut config = sample_config();
    config
        .system
        .database
        .0
        .insert("db.3".to_string(), database("h", 3310, "db3"));

    let err = Manager::new(MemStore::new(), config).unwrap_err();
    match err {
        ConfigError::Schema { topic, .. } => assert_eq!(topic, "system.database.db.3"),
        other => panic!("unexpected error {:?}", other),
    }
}

// =============================================================================
// Update Tests
// =============================================================================

#[test]
fn test_leaf_update_changes_exactly_one_entry() {
    let (store, manager) = setup_manager();
    let before = store.snapshot();

    let outcome = manager.update(Changes::new().set("server.port", 9090)).unwrap();

    assert_eq!(outcome.changed, vec!["server.port".to_string()]);
    assert!(outcome.removed.is_empty());
    assert_eq!(manager.get("server.port").unwrap(), Node::Scalar(Scalar::Int(9090)));
    assert_eq!(manager.get("server.host").unwrap(), Node::Scalar("localhost".into()));
    assert_eq!(changed_keys(&before, &store.snapshot()), vec!["config.server.port".to_string()]);
}

#[test]
fn test_subtree_replace_is_validated() {
    let (store, manager) = setup_manager();
    let before = store.snapshot();
    let transactions = store.transactions();

    let err = manager
        .update(Changes::new().set("system.database.db2", database("h2", 3307, "db2b")))
        .unwrap_err();

    match err {
        ConfigError::Validation(errors) => {
            assert_eq!(errors.len(), 1);
            assert_eq!(errors.failures[0].topic, "system.database.db2");
            assert_eq!(errors.failures[0].message, "invalid port 3307");
        }
        other => panic!("unexpected error {:?}", other),
    }
    assert_eq!(store.snapshot(), before);
    assert_eq!(store.transactions(), transactions);
    assert_eq!(manager.root().unwrap(), sample_config());
}

#[test]
fn test_subtree_replace_commits_atomically() {
    let (store, manager) = setup_manager();
    let before = store.snapshot();

    manager
        .update(Changes::new().set("system.database.db2", database("h2", 3310, "db2b")))
        .unwrap();

    let db2: DatabaseConfig = manager.get_as("system.database.db2").unwrap();
    assert_eq!(db2, database("h2", 3310, "db2b"));
    let db1: DatabaseConfig = manager.get_as("system.database.db1").unwrap();
    assert_eq!(db1, database("localhost", 3306, "db1"));
    assert_eq!(
        changed_keys(&before, &store.snapshot()),
        vec![
            "config.system.database.db2.host".to_string(),
            "config.system.database.db2.name".to_string(),
            "config.system.database.db2.port".to_string(),
        ]
    );
}

#[test]
fn test_every_validation_failure_is_reported() {
    let (_store, manager) = setup_manager();

    let err = manager
        .update(
            Changes::new()
                .set("system.database.db1.port", 3307)
                .set("system.database.db2.port", 3309),
        )
        .unwrap_err();

    match err {
        ConfigError::Validation(errors) => {
            let topics: Vec<&str> = errors.iter().map(|f| f.topic.as_str()).collect();
            assert_eq!(topics, vec!["system.database.db1", "system.database.db2"]);
        }
        other => panic!("unexpected error {:?}", other),
    }
}

#[test]
fn test_unknown_topic_rejects_whole_batch() {
    let (store, manager) = setup_manager();
    let before = store.snapshot();

    let err = manager
        .update(
            Changes::new()
                .set("server.host", "newserverhost")
                .set("server.port", 8090)
                .set("server.test.name", "newtest"),
        )
        .unwrap_err();

    assert!(matches!(err, ConfigError::NotFound { ref topic } if topic == "server.test.name"));
    assert_eq!(store.snapshot(), before);
    assert_eq!(manager.get("server.host").unwrap(), Node::Scalar("localhost".into()));
}

#[test]
fn test_skip_field_is_not_addressable() {
    let (_store, manager) = setup_manager();

    let err = manager
        .update(Changes::new().set("system.database.db1.not_save", "x"))
        .unwrap_err();

    assert!(matches!(err, ConfigError::NotFound { .. }));
    assert!(matches!(manager.get("system.database.db1.not_save"), Err(ConfigError::NotFound { .. })));
}

#[test]
fn test_type_mismatch_and_coercion() {
    let (_store, manager) = setup_manager();

    let err = manager.update(Changes::new().set("server.port", "abc")).unwrap_err();
    assert!(matches!(err, ConfigError::TypeMismatch { ref topic, .. } if topic == "server.port"));

    manager.update(Changes::new().set("server.port", "9092")).unwrap();
    assert_eq!(manager.get_as::<i64>("server.port").unwrap(), 9092);
}

#[test]
fn test_unrepresentable_value_is_type_mismatch() {
    let (_store, manager) = setup_manager();

    let err = manager.update(Changes::new().set("server.port", u64::MAX)).unwrap_err();
    assert!(matches!(err, ConfigError::TypeMismatch { ref topic, .. } if topic == "server.port"));
}

#[test]
fn test_resubmitting_committed_value_is_noop() {
    let (store, manager) = setup_manager();
    let transactions = store.transactions();

    let outcome = manager
        .update(Changes::new().set("system.database.db1", database("localhost", 3306, "db1")))
        .unwrap();

    assert!(outcome.is_noop());
    assert_eq!(store.transactions(), transactions);
}

#[test]
fn test_store_failure_aborts_update() {
    let (store, manager) = setup_manager();
    let before = store.snapshot();
    store.fail_transactions(true);

    let err = manager.update(Changes::new().set("server.port", 9090)).unwrap_err();

    assert!(matches!(err, ConfigError::Store(_)));
    assert_eq!(store.snapshot(), before);
    assert_eq!(manager.get_as::<i64>("server.port").unwrap(), 8080);

    store.fail_transactions(false);
    manager.update(Changes::new().set("server.port", 9090)).unwrap();
    assert_eq!(manager.get_as::<i64>("server.port").unwrap(), 9090);
}

#[test]
fn test_unknown_field_in_new_mapping_entry_is_not_found() {
    let (store, manager) = setup_manager();
    let before = store.snapshot();

    let db3: BTreeMap<String, Node> = [
        ("host", Scalar::from("h3")),
        ("port", Scalar::from(3310)),
        ("name", Scalar::from("db3")),
        ("bogus", Scalar::from(true)),
    ]
    .into_iter()
    .map(|(key, value)| (key.to_string(), Node::Scalar(value)))
    .collect();

    let err = manager
        .update(Changes::new().set_node("system.database.db3", Node::Mapping(db3)))
        .unwrap_err();

    assert!(matches!(err, ConfigError::NotFound { ref topic } if topic == "system.database.db3.bogus"));
    assert_eq!(store.snapshot(), before);
}

// =============================================================================
// Container Shape Tests
// =============================================================================

#[test]
fn test_new_mapping_entry_is_indexed() {
    let (store, manager) = setup_manager();

    manager
        .update(Changes::new().set("system.database.db3", database("h3", 3310, "db3")))
        .unwrap();

    assert_eq!(store.get("config.system.database.db3.port").unwrap(), Scalar::Int(3310));
    assert_eq!(manager.resolve("database:db3").as_deref(), Some("system.database.db3"));
    assert_eq!(manager.get_as::<String>("database:db3.host").unwrap(), "h3");
}

#[test]
fn test_sequence_shrink_deletes_stale_entries() {
    let (store, manager) = setup_manager();

    let outcome = manager
        .update(Changes::new().set("system.supported_os", OsConfigs(vec![os("linux", "kernel x")])))
        .unwrap();

    assert_eq!(outcome.changed, vec!["system.supported_os.0.version".to_string()]);
    assert_eq!(
        outcome.removed,
        vec![
            "system.supported_os.1.name".to_string(),
            "system.supported_os.1.version".to_string(),
        ]
    );
    assert!(!store.has("config.system.supported_os.1.name").unwrap());
    assert_eq!(manager.resolve("os:windows"), None);
}

#[test]
fn test_sequence_grows_at_its_tail() {
    let (_store, manager) = setup_manager();

    manager
        .update(Changes::new().set("system.supported_os.2", os("mac", "10.1")))
        .unwrap();
    assert_eq!(manager.get_as::<OsConfig>("os:mac").unwrap(), os("mac", "10.1"));

    let err = manager
        .update(Changes::new().set("system.supported_os.5", os("bsd", "14")))
        .unwrap_err();
    assert!(matches!(err, ConfigError::NotFound { .. }));
}

#[test]
fn test_replace_entries_prunes_unmentioned_children() {
    let (store, manager) = setup_manager();

    let mut entries = Entries::new();
    entries.insert("db1.host".to_string(), "localhost".into());
    entries.insert("db1.port".to_string(), Scalar::Int(3306));
    entries.insert("db1.name".to_string(), "db1".into());

    let outcome = manager.replace_entries("system.database", entries).unwrap();

    assert_eq!(outcome.removed.len(), 3);
    assert!(!store.has("config.system.database.db2.host").unwrap());
    let databases: DatabaseConfigMap = manager.get_as("databases").unwrap();
    assert_eq!(databases.0.len(), 1);
}

// =============================================================================
// Override Topic Tests
// =============================================================================

#[test]
fn test_update_through_override_topic() {
    let (store, manager) = setup_manager();

    manager
        .update(
            Changes::new()
                .set("database:db1.port", 3400)
                .set("system:name", "Renamed"),
        )
        .unwrap();

    assert_eq!(store.get("config.system.database.db1.port").unwrap(), Scalar::Int(3400));
    assert_eq!(store.get("config.system.name").unwrap(), Scalar::Str("Renamed".to_string()));
    assert_eq!(manager.get_as::<String>("system.name").unwrap(), "Renamed");
}

#[test]
fn test_changed_override_is_reindexed() {
    let (_store, manager) = setup_manager();

    manager
        .update(Changes::new().set("system.database.db1.name", "newdb1"))
        .unwrap();

    assert_eq!(manager.resolve("database:newdb1").as_deref(), Some("system.database.db1"));
    assert!(matches!(manager.get("database:db1"), Err(ConfigError::NotFound { .. })));
}

#[test]
fn test_override_collision_aborts_update() {
    let (store, manager) = setup_manager();
    let before = store.snapshot();

    let err = manager
        .update(Changes::new().set("system.database.db2.name", "db1"))
        .unwrap_err();

    assert!(matches!(err, ConfigError::Schema { .. }));
    assert_eq!(store.snapshot(), before);
    assert_eq!(manager.resolve("database:db2").as_deref(), Some("system.database.db2"));
}

#[test]
fn test_aliases_listing() {
    let (_store, manager) = setup_manager();
    let aliases: Vec<String> = manager.aliases().into_iter().map(|(alias, _)| alias).collect();

    assert_eq!(
        aliases,
        vec![
            "database:db1",
            "database:db2",
            "databases",
            "os:linux",
            "os:windows",
            "supported_os",
            "system:name",
        ]
    );
}

// =============================================================================
// Read Accessor Tests
// =============================================================================

#[test]
fn test_get_returns_owned_copy() {
    let (_store, manager) = setup_manager();
    let server = manager.get("server").unwrap();

    manager.update(Changes::new().set("server.port", 9090)).unwrap();

    assert_eq!(server.lookup("port"), Some(&Node::Scalar(Scalar::Int(8080))));
    assert_eq!(manager.snapshot().lookup("server.port"), Some(&Node::Scalar(Scalar::Int(9090))));
}

#[test]
fn test_handle_tracks_updates() {
    let (_store, manager) = setup_manager();
    let server = manager.handle::<ServerConfig>("server").unwrap();
    let db2 = manager.handle::<DatabaseConfig>("database:db2").unwrap();
    assert_eq!(db2.path(), "system.database.db2");

    manager
        .update(Changes::new().set("server.host", "newserverhost"))
        .unwrap();
    assert_eq!(server.load().unwrap().host, "newserverhost");

    let mut only_db1 = BTreeMap::new();
    only_db1.insert("db1".to_string(), database("localhost", 3306, "db1"));
    manager
        .update(Changes::new().set("databases", DatabaseConfigMap(only_db1)))
        .unwrap();
    assert!(matches!(db2.load(), Err(ConfigError::NotFound { .. })));
}

#[test]
fn test_handle_for_missing_topic() {
    let (_store, manager) = setup_manager();
    assert!(matches!(
        manager.handle::<ServerConfig>("nowhere"),
        Err(ConfigError::NotFound { .. })
    ));
}

#[test]
fn test_entries_and_topics() {
    let (_store, manager) = setup_manager();

    let entries = manager.entries();
    assert_eq!(entries.len(), sample_entries().len());
    assert_eq!(entries.get("server.port"), Some(&Scalar::Int(8080)));

    let topics = manager.topics();
    assert_eq!(topics[0], "");
    assert!(topics.contains(&"system.supported_os.1.version".to_string()));
}

#[test]
fn test_trace_entries_option_is_kept() {
    let options = ManagerOptions::builder().trace_entries(true).build();
    let manager = Manager::with_options(MemStore::new(), sample_config(), options).unwrap();

    assert!(manager.options().trace_entries);
    manager.update(Changes::new().set("server.port", 9090)).unwrap();
    assert_eq!(manager.store().get("config.server.port").unwrap(), Scalar::Int(9090));
}

// =============================================================================
// Restart Tests
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct Tls {
    cert: String,
    key_path: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct Route {
    upstream: String,
    weight: u8,
    headers: Vec<String>,
}

impl Section for Route {}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct Edge {
    port: u16,
    backup: Option<u16>,
    tls: Option<Tls>,
    routes: BTreeMap<String, Route>,
}

impl Section for Edge {}

impl ConfigRoot for Edge {
    const NAME: &'static str = "edge";

    fn sections(sections: &mut Sections) {
        sections.register::<Route>("routes.*");
    }
}

fn tls() -> Tls {
    Tls {
        cert: "pem".to_string(),
        key_path: "/etc/key".to_string(),
    }
}

#[test]
fn test_filled_option_survives_restart() {
    let store = Arc::new(MemStore::new());
    {
        let manager = Manager::new(store.clone(), Edge::default()).unwrap();
        manager.update(Changes::new().set("tls", tls())).unwrap();
    }
    assert_eq!(store.get("edge.tls.cert").unwrap(), Scalar::from("pem"));

    let manager = Manager::new(store.clone(), Edge::default()).unwrap();

    assert_eq!(manager.root().unwrap().tls, Some(tls()));
    assert_eq!(store.get("edge.tls.cert").unwrap(), Scalar::from("pem"));
    assert!(!store.has("edge.tls").unwrap());
}

#[test]
fn test_option_field_filled_leaf_by_leaf() {
    let store = Arc::new(MemStore::new());
    let manager = Manager::new(store.clone(), Edge::default()).unwrap();

    manager
        .update(Changes::new().set("tls.cert", "pem").set("tls.key_path", "/etc/key"))
        .unwrap();

    assert_eq!(manager.root().unwrap().tls, Some(tls()));
    assert_eq!(store.get("edge.tls.key_path").unwrap(), Scalar::from("/etc/key"));
}

#[test]
fn test_empty_collections_survive_restart() {
    let mut edge = Edge::default();
    edge.routes.insert(
        "api".to_string(),
        Route {
            upstream: "10.0.0.1".to_string(),
            weight: 1,
            headers: Vec::new(),
        },
    );

    let store = Arc::new(MemStore::new());
    {
        let manager = Manager::new(store.clone(), edge.clone()).unwrap();
        assert_eq!(manager.entries().get("routes.api.headers"), Some(&Scalar::Null));
    }

    let manager = Manager::new(store.clone(), Edge::default()).unwrap();
    assert_eq!(manager.root().unwrap(), edge);

    // Emptying a collection keeps a marker; refilling it drops the marker
    manager
        .update(Changes::new().set("routes", BTreeMap::<String, Route>::new()))
        .unwrap();
    assert_eq!(store.get("edge.routes").unwrap(), Scalar::Null);
    manager.update(Changes::new().set("routes.web", edge.routes["api"].clone())).unwrap();
    assert!(!store.has("edge.routes").unwrap());

    drop(manager);
    let manager = Manager::new(store, Edge::default()).unwrap();
    assert_eq!(manager.root().unwrap().routes.len(), 1);
}

#[test]
fn test_out_of_range_value_reports_the_leaf() {
    let mut edge = Edge::default();
    edge.routes.insert("api".to_string(), Route::default());
    let store = Arc::new(MemStore::new());
    let manager = Manager::new(store.clone(), edge).unwrap();
    let before = store.snapshot();

    let err = manager.update(Changes::new().set("port", 70000)).unwrap_err();
    assert!(matches!(err, ConfigError::TypeMismatch { ref topic, .. } if topic == "port"));

    let err = manager.update(Changes::new().set("port", -1)).unwrap_err();
    assert!(matches!(err, ConfigError::TypeMismatch { ref topic, .. } if topic == "port"));

    let err = manager.update(Changes::new().set("backup", "abc")).unwrap_err();
    assert!(matches!(err, ConfigError::TypeMismatch { ref topic, .. } if topic == "backup"));

    let err = manager.update(Changes::new().set("routes.api.weight", 300)).unwrap_err();
    assert!(matches!(err, ConfigError::TypeMismatch { ref topic, .. } if topic == "routes.api.weight"));

    assert_eq!(store.snapshot(), before);
    assert_eq!(manager.get_as::<u16>("port").unwrap(), 0);
}
