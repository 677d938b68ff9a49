//! Manager Module
//!
//! Owns the canonical tree and keeps it in agreement with the backing store.
//!
//! ## Concurrency Model: Single-Writer / Multiple-Reader
//!
//! - **Updates**: hold the write lock from staging through the store
//!   transaction to the commit, so updates serialize globally and no reader
//!   ever observes a partially staged tree
//! - **Reads**: take the read lock and return owned copies
//!
//! ## Startup
//! 1. Reflect the root value and index it
//! 2. Hydrate from the store or keep the root value, per `InitMode`
//! 3. Reconcile: one transaction makes the namespace equal the tree

mod handle;
mod update;
mod validate;

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use crate::codec::{self, Diff, Entries};
use crate::config::{InitMode, ManagerOptions};
use crate::error::{ConfigError, Result, StoreResult};
use crate::node::{from_node_at, reflect, Node, Scalar};
use crate::schema::{ConfigRoot, Sections, TopicIndex};
use crate::store::KvStore;
use crate::topic;

pub use handle::SectionHandle;
pub use update::{Changes, UpdateOutcome, UpdatePhase};

/// Everything guarded by the manager lock
pub(crate) struct State {
    pub(crate) tree: Node,
    pub(crate) index: TopicIndex,

    /// Flat view of `tree`, topics relative to the root
    pub(crate) entries: Entries,
}

/// Synchronizes a typed configuration root with a key-value store
pub struct Manager<T: ConfigRoot, S: KvStore> {
    store: S,
    options: ManagerOptions,

    /// Prefix of every store key owned by this manager
    namespace: String,

    state: Arc<RwLock<State>>,
    _root: PhantomData<fn() -> T>,
}

impl<T: ConfigRoot, S: KvStore> Manager<T, S> {
    /// Create a manager with default options
    pub fn new(store: S, root: T) -> Result<Self> {
        Self::with_options(store, root, ManagerOptions::default())
    }

    /// Create a manager
    ///
    /// Fails with `ConfigError::Schema` when the root cannot be indexed, and
    /// with `TypeMismatch` or `Store` errors when hydration or the initial
    /// reconcile fails.
    pub fn with_options(store: S, root: T, options: ManagerOptions) -> Result<Self> {
        let namespace = options.namespace.clone().unwrap_or_else(|| T::NAME.to_string());
        let sections = Arc::new(Sections::for_root::<T>());

        let tree = reflect(&root).map_err(|e| ConfigError::schema("", e.to_string()))?;
        TopicIndex::build(&tree, sections.clone())?;

        let stored = load_namespace(&store, &namespace)?;
        let hydrate = match options.init_mode {
            InitMode::Auto => !stored.is_empty(),
            InitMode::Materialize => false,
            InitMode::Hydrate => true,
        };

        let tree = if hydrate {
            info!(namespace = %namespace, entries = stored.len(), "hydrating from store");
            hydrate_tree::<T>(&tree, &stored)?
        } else {
            info!(namespace = %namespace, "materializing root value");
            tree
        };
        let index = TopicIndex::build(&tree, sections)?;
        let entries = codec::flatten(&tree);

        let reconcile = codec::diff(&stored, &entries);
        if !reconcile.is_empty() {
            write_diff(&store, &namespace, &reconcile, options.trace_entries)?;
        }
        debug!(
            nodes = index.len(),
            entries = entries.len(),
            written = reconcile.set.len(),
            deleted = reconcile.removed.len(),
            "manager ready"
        );

        Ok(Self {
            store,
            options,
            namespace,
            state: Arc::new(RwLock::new(State { tree, index, entries })),
            _root: PhantomData,
        })
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Copy of the node at `topic` (a path or an override topic)
    pub fn get(&self, topic: &str) -> Result<Node> {
        let state = self.state.read();
        let path = state.index.resolve(topic);
        state
            .tree
            .lookup(&path)
            .cloned()
            .ok_or_else(|| ConfigError::not_found(topic))
    }

    /// Node at `topic` decoded into `V`
    pub fn get_as<V: DeserializeOwned>(&self, topic: &str) -> Result<V> {
        let node = self.get(topic)?;
        from_node_at(node, topic)
    }

    /// The whole tree decoded into the root type
    pub fn root(&self) -> Result<T> {
        let tree = self.state.read().tree.clone();
        from_node_at(tree, "")
    }

    /// Typed handle on one subtree, resolved once
    ///
    /// The topic is resolved to its path now; later `load` calls read the
    /// node at that path even if its override changes.
    pub fn handle<V: DeserializeOwned>(&self, topic: &str) -> Result<SectionHandle<V>> {
        let path = {
            let state = self.state.read();
            let path = state.index.resolve(topic).into_owned();
            if state.index.id_of_path(&path).is_none() {
                return Err(ConfigError::not_found(topic));
            }
            path
        };
        let handle = SectionHandle::new(self.state.clone(), path);
        handle.load()?;
        Ok(handle)
    }

    /// Flat snapshot of every entry, topics relative to the root
    pub fn entries(&self) -> Entries {
        self.state.read().entries.clone()
    }

    /// Paths of every live node, parents before children
    pub fn topics(&self) -> Vec<String> {
        self.state.read().index.paths().map(str::to_string).collect()
    }

    /// Override topics and the paths they stand for
    pub fn aliases(&self) -> Vec<(String, String)> {
        let state = self.state.read();
        let mut aliases: Vec<(String, String)> = state
            .index
            .aliases()
            .map(|(alias, path)| (alias.to_string(), path.to_string()))
            .collect();
        aliases.sort();
        aliases
    }

    /// Path a topic stands for, `None` when nothing lives there
    pub fn resolve(&self, topic: &str) -> Option<String> {
        let state = self.state.read();
        let path = state.index.resolve(topic);
        state.index.id_of_path(&path).map(|_| path.into_owned())
    }

    /// Copy of the whole tree
    pub fn snapshot(&self) -> Node {
        self.state.read().tree.clone()
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn options(&self) -> &ManagerOptions {
        &self.options
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}

impl<T: ConfigRoot, S: KvStore> fmt::Debug for Manager<T, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.read();
        f.debug_struct("Manager")
            .field("root", &T::NAME)
            .field("namespace", &self.namespace)
            .field("nodes", &state.index.len())
            .field("entries", &state.entries.len())
            .finish()
    }
}

// =============================================================================
// Store Helpers
// =============================================================================

/// Entries of `namespace` currently in the store, keyed by topic
fn load_namespace(store: &dyn KvStore, namespace: &str) -> Result<Entries> {
    Ok(store
        .get_all()?
        .into_iter()
        .filter_map(|(key, value)| {
            codec::topic_of_key(namespace, &key).map(|topic| (topic.to_string(), value))
        })
        .collect())
}

/// Write a diff inside one store transaction
pub(crate) fn write_diff(
    store: &dyn KvStore,
    namespace: &str,
    diff: &Diff,
    trace_entries: bool,
) -> StoreResult<()> {
    if trace_entries {
        for (topic, value) in &diff.set {
            debug!(key = %codec::store_key(namespace, topic), value = %value, "persisting entry");
        }
        for topic in &diff.removed {
            debug!(key = %codec::store_key(namespace, topic), "deleting entry");
        }
    }

    let set: Entries = diff
        .set
        .iter()
        .map(|(topic, value)| (codec::store_key(namespace, topic), value.clone()))
        .collect();
    let removed: Vec<String> = diff
        .removed
        .iter()
        .map(|topic| codec::store_key(namespace, topic))
        .collect();

    store.transaction(&mut |tx: &dyn KvStore| {
        tx.set_many(set.clone())?;
        tx.delete_many(&removed)
    })
}

// =============================================================================
// Tree Helpers
// =============================================================================

/// Decode a tree into the root type and reflect it back
///
/// Fills serde defaults and turns containers created on demand into the
/// kinds the root type declares.
pub(crate) fn normalize<T: ConfigRoot>(tree: Node) -> Result<Node> {
    let typed: T = from_node_at(tree, "")?;
    reflect(&typed).map_err(|e| ConfigError::schema("", e.to_string()))
}

/// Rebuild the tree from stored entries over the root value's shape
///
/// Mappings and sequences start empty so the store decides their members.
/// Entries the schema has no place for are stale and dropped; the reconcile
/// that follows deletes them from the store.
fn hydrate_tree<T: ConfigRoot>(root: &Node, stored: &Entries) -> Result<Node> {
    let mut ordered: Vec<(&String, &Scalar)> = stored.iter().collect();
    ordered.sort_by(|a, b| topic::natural_cmp(a.0, b.0));

    let mut tree = root.skeleton();
    for (topic, value) in ordered {
        match codec::apply(&mut tree, topic, Node::Scalar(value.clone())) {
            Ok(()) => {}
            Err(ConfigError::NotFound { .. }) => {
                warn!(topic = %topic, "dropping stale entry");
            }
            Err(e) => return Err(e),
        }
    }
    normalize::<T>(tree)
}
