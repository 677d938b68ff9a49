//! Tests for concurrent Manager access
//!
//! These tests verify:
//! - Concurrent updates to disjoint topics all commit
//! - Overlapping updates serialize, the last committer wins
//! - Readers never observe a partially staged tree

#[path = "../common/mod.rs"]
mod common;

use std::sync::Arc;
use std::thread;

use cfgsync::{Changes, KvStore, Manager, MemStore, Scalar};
use common::{database, sample_config, Config, DatabaseConfig, FlakyStore};

#[test]
fn test_disjoint_updates_all_commit() {
    let store = FlakyStore::new();
    let manager = Arc::new(Manager::new(store.clone(), sample_config()).unwrap());

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let manager = Arc::clone(&manager);
            thread::spawn(move || {
                let name = format!("db{}", 10 + i);
                let port = 4000 + 2 * i as i64;
                manager
                    .update(Changes::new().set(format!("system.database.{}", name), database("h", port, &name)))
                    .unwrap();
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    let root: Config = manager.root().unwrap();
    assert_eq!(root.system.database.0.len(), 10);
    for i in 0..8 {
        let key = format!("config.system.database.db{}.port", 10 + i);
        assert_eq!(store.get(&key).unwrap(), Scalar::Int(4000 + 2 * i));
    }
}

#[test]
fn test_overlapping_updates_last_committer_wins() {
    let store = Arc::new(MemStore::new());
    let manager = Arc::new(Manager::new(store.clone(), sample_config()).unwrap());

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let manager = Arc::clone(&manager);
            thread::spawn(move || {
                for j in 0..25 {
                    let port = 9000 + i * 100 + j;
                    manager.update(Changes::new().set("server.port", port)).unwrap();
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    // Whatever committed last is both in memory and in the store
    let port: i64 = manager.get_as("server.port").unwrap();
    assert_eq!(store.get("config.server.port").unwrap(), Scalar::Int(port));
    assert!((9000..9800).contains(&port));
}

#[test]
fn test_readers_see_whole_updates() {
    let manager = Arc::new(Manager::new(MemStore::new(), sample_config()).unwrap());

    let writer = {
        let manager = Arc::clone(&manager);
        thread::spawn(move || {
            for i in 0..100 {
                let port = 5000 + 2 * i;
                manager
                    .update(Changes::new().set("system.database.db1", database(&format!("host{}", port), port, "db1")))
                    .unwrap();
            }
        })
    };

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let manager = Arc::clone(&manager);
            thread::spawn(move || {
                for _ in 0..200 {
                    let db1: DatabaseConfig = manager.get_as("database:db1").unwrap();
                    if db1.host != "localhost" {
                        assert_eq!(db1.host, format!("host{}", db1.port));
                    }
                }
            })
        })
        .collect();

    writer.join().unwrap();
    for reader in readers {
        reader.join().unwrap();
    }
}

#[test]
fn test_handles_are_shared_across_threads() {
    let manager = Arc::new(Manager::new(MemStore::new(), sample_config()).unwrap());
    let handle = manager.handle::<DatabaseConfig>("database:db2").unwrap();

    let reader = {
        let handle = handle.clone();
        thread::spawn(move || handle.load().unwrap().port)
    };
    let port = reader.join().unwrap();

    assert_eq!(port, 3308);
    manager.update(Changes::new().set("database:db2.port", 3310)).unwrap();
    assert_eq!(handle.load().unwrap().port, 3310);
}
