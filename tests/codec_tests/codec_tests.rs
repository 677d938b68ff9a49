//! Tests for the Flattener / Unflattener
//!
//! These tests verify:
//! - Flatten emits one entry per scalar leaf, and a null for empty containers
//! - Unflatten over a skeleton reproduces the tree
//! - Leaf merges coerce; container writes replace
//! - Novel record fields are rejected, mapping keys are created
//! - Diff and store key helpers

use std::collections::BTreeMap;

use cfgsync::codec::{self, diff, flatten, flatten_at, store_key, topic_of_key, unflatten};
use cfgsync::node::{from_node, reflect};
use cfgsync::{ConfigError, Entries, Node, Scalar};
use serde::{Deserialize, Serialize};

// =============================================================================
// Fixtures
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Database {
    host: String,
    port: i64,
    replicas: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Settings {
    name: String,
    timeout: f64,
    debug: bool,
    tags: Vec<String>,
    databases: BTreeMap<String, Database>,
    nothing: Option<i64>,
    empty: Vec<i64>,
}

fn settings() -> Settings {
    let mut databases = BTreeMap::new();
    databases.insert(
        "primary".to_string(),
        Database { host: "a".to_string(), port: 1, replicas: vec!["r1".to_string()] },
    );
    databases.insert(
        "replica".to_string(),
        Database { host: "b".to_string(), port: 2, replicas: Vec::new() },
    );

    Settings {
        name: "svc".to_string(),
        timeout: 1.5,
        debug: false,
        tags: (0..12).map(|i| format!("t{}", i)).collect(),
        databases,
        nothing: None,
        empty: Vec::new(),
    }
}

fn entry(topic: &str, value: impl Into<Scalar>) -> (String, Scalar) {
    (topic.to_string(), value.into())
}

// =============================================================================
// Flatten Tests
// =============================================================================

#[test]
fn test_flatten_emits_scalar_leaves() {
    let entries = flatten(&reflect(&settings()).unwrap());

    assert_eq!(entries.get("name"), Some(&Scalar::Str("svc".to_string())));
    assert_eq!(entries.get("databases.replica.port"), Some(&Scalar::Int(2)));
    assert_eq!(entries.get("tags.11"), Some(&Scalar::Str("t11".to_string())));
    assert_eq!(entries.get("nothing"), Some(&Scalar::Null));
    assert_eq!(entries.get("empty"), Some(&Scalar::Null));
    assert_eq!(entries.get("databases.replica.replicas"), Some(&Scalar::Null));
    assert_eq!(entries.len(), 3 + 12 + 6 + 1 + 1);
}

#[test]
fn test_flatten_at_prefixes_topics() {
    let tree = reflect(&settings()).unwrap();
    let entries = flatten_at(tree.lookup("databases.primary").unwrap(), "databases.primary");

    assert_eq!(
        entries.keys().cloned().collect::<Vec<_>>(),
        vec![
            "databases.primary.host".to_string(),
            "databases.primary.port".to_string(),
            "databases.primary.replicas.0".to_string(),
        ]
    );
}

// =============================================================================
// Unflatten Tests
// =============================================================================

#[test]
fn test_unflatten_over_skeleton_reproduces_tree() {
    let tree = reflect(&settings()).unwrap();
    let rebuilt = unflatten(flatten(&tree), tree.skeleton()).unwrap();

    let decoded: Settings = from_node(rebuilt).unwrap();
    assert_eq!(decoded, settings());
    assert!(decoded.databases["replica"].replicas.is_empty());
}

#[test]
fn test_unflatten_is_additive() {
    let tree = reflect(&settings()).unwrap();
    let rebuilt = unflatten(vec![entry("name", "other")], tree.clone()).unwrap();

    assert_eq!(rebuilt.lookup("name"), Some(&Node::Scalar("other".into())));
    assert_eq!(rebuilt.lookup("databases.replica"), tree.lookup("databases.replica"));
}

#[test]
fn test_unflatten_coerces_to_declared_type() {
    let tree = reflect(&settings()).unwrap();
    let rebuilt = unflatten(
        vec![entry("timeout", 3), entry("debug", "true"), entry("databases.primary.port", "5432")],
        tree,
    )
    .unwrap();

    assert_eq!(rebuilt.lookup("timeout"), Some(&Node::Scalar(Scalar::Float(3.0))));
    assert_eq!(rebuilt.lookup("debug"), Some(&Node::Scalar(Scalar::Bool(true))));
    assert_eq!(rebuilt.lookup("databases.primary.port"), Some(&Node::Scalar(Scalar::Int(5432))));
}

#[test]
fn test_unflatten_reports_mismatch_topic() {
    let tree = reflect(&settings()).unwrap();
    let err = unflatten(vec![entry("databases.primary.port", "many")], tree).unwrap_err();

    match err {
        ConfigError::TypeMismatch { topic, .. } => assert_eq!(topic, "databases.primary.port"),
        other => panic!("unexpected error {:?}", other),
    }
}

#[test]
fn test_unflatten_rejects_novel_record_field() {
    let tree = reflect(&settings()).unwrap();
    let err = unflatten(vec![entry("databases.primary.user", "root")], tree).unwrap_err();

    assert!(matches!(err, ConfigError::NotFound { ref topic } if topic == "databases.primary.user"));
}

#[test]
fn test_unflatten_creates_mapping_keys() {
    let tree = reflect(&settings()).unwrap();
    let rebuilt = unflatten(
        vec![
            entry("databases.backup.host", "c"),
            entry("databases.backup.port", 3),
            entry("databases.backup.replicas", Scalar::Null),
        ],
        tree,
    )
    .unwrap();

    let decoded: Settings = from_node(rebuilt).unwrap();
    assert_eq!(
        decoded.databases["backup"],
        Database { host: "c".to_string(), port: 3, replicas: Vec::new() }
    );
}

#[test]
fn test_unflatten_fills_none_option_from_entries() {
    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Listener {
        port: i64,
        tls: Option<Database>,
    }

    let shape = reflect(&Listener { port: 1, tls: None }).unwrap();
    let rebuilt = unflatten(
        vec![
            entry("tls.host", "h"),
            entry("tls.port", 2),
            entry("tls.replicas", Scalar::Null),
        ],
        shape,
    )
    .unwrap();

    let decoded: Listener = from_node(rebuilt).unwrap();
    assert_eq!(decoded.tls, Some(Database { host: "h".to_string(), port: 2, replicas: Vec::new() }));
}

#[test]
fn test_unflatten_rejects_descent_through_scalar() {
    let tree = reflect(&settings()).unwrap();
    let err = unflatten(vec![entry("name.first", "x")], tree).unwrap_err();
    assert!(matches!(err, ConfigError::NotFound { .. }));
}

// =============================================================================
// Apply Tests
// =============================================================================

#[test]
fn test_apply_container_value_replaces_subtree() {
    let mut tree = reflect(&settings()).unwrap();
    let replacement = reflect(&vec!["only".to_string()]).unwrap();

    codec::apply(&mut tree, "tags", replacement).unwrap();

    let decoded: Settings = from_node(tree).unwrap();
    assert_eq!(decoded.tags, vec!["only".to_string()]);
}

#[test]
fn test_apply_scalar_onto_container_is_mismatch() {
    let mut tree = reflect(&settings()).unwrap();
    let err = codec::apply(&mut tree, "databases", Node::Scalar(Scalar::Int(1))).unwrap_err();
    assert!(matches!(err, ConfigError::TypeMismatch { .. }));
}

#[test]
fn test_apply_fills_null_leaf_with_any_value() {
    let mut tree = reflect(&settings()).unwrap();
    codec::apply(&mut tree, "nothing", Node::Scalar(Scalar::Int(4))).unwrap();

    let decoded: Settings = from_node(tree).unwrap();
    assert_eq!(decoded.nothing, Some(4));
}

// =============================================================================
// Diff and Key Tests
// =============================================================================

#[test]
fn test_diff_of_equal_sets_is_empty() {
    let entries = flatten(&reflect(&settings()).unwrap());
    assert!(diff(&entries, &entries).is_empty());
}

#[test]
fn test_diff_after_sequence_shrink() {
    let before = flatten(&reflect(&settings()).unwrap());
    let mut shorter = settings();
    shorter.tags.truncate(10);
    let after = flatten(&reflect(&shorter).unwrap());

    let diff = diff(&before, &after);
    assert!(diff.set.is_empty());
    assert_eq!(diff.removed, vec!["tags.10".to_string(), "tags.11".to_string()]);
}

#[test]
fn test_store_keys() {
    assert_eq!(store_key("config", ""), "config");
    assert_eq!(store_key("", "server.port"), "server.port");
    assert_eq!(topic_of_key("config", "config"), Some(""));
    assert_eq!(topic_of_key("config", "other.port"), None);

    let namespaced: Entries = [entry("a.b", 1)]
        .into_iter()
        .map(|(topic, value)| (store_key("ns", &topic), value))
        .collect();
    assert!(namespaced.contains_key("ns.a.b"));
}
