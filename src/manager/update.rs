//! Update Protocol
//!
//! ```text
//! Staging ──► Validating ──► Persisting ──► Committed
//!    │             │              │
//!    └─────────────┴──────────────┴──────► Aborted
//! ```
//!
//! The canonical tree is only replaced in `Committed`. Every earlier phase
//! works on a private copy, so an aborted update leaves the tree, the index
//! and the store exactly as they were.

use serde::Serialize;
use tracing::debug;

use crate::codec::{self, Entries};
use crate::error::{ConfigError, Result};
use crate::node::{reflect, Node, NodeError, Scalar};
use crate::schema::{ConfigRoot, TopicIndex};
use crate::store::KvStore;
use crate::topic;

use super::{normalize, validate, write_diff, Manager, State};

/// A batch of values to write, keyed by topic
///
/// A value at a leaf topic is merged into that leaf; a value at a container
/// topic replaces the whole subtree.
#[derive(Debug, Default)]
pub struct Changes {
    items: Vec<(String, std::result::Result<Node, NodeError>)>,
}

impl Changes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a typed value; reflection errors surface from `update`
    pub fn set<V: Serialize>(mut self, topic: impl Into<String>, value: V) -> Self {
        self.items.push((topic.into(), reflect(&value)));
        self
    }

    /// Add an already reflected value
    pub fn set_node(mut self, topic: impl Into<String>, node: Node) -> Self {
        self.items.push((topic.into(), Ok(node)));
        self
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Topics in the order they were added
    pub fn topics(&self) -> impl Iterator<Item = &str> {
        self.items.iter().map(|(topic, _)| topic.as_str())
    }
}

impl<K: Into<String>> FromIterator<(K, Node)> for Changes {
    fn from_iter<I: IntoIterator<Item = (K, Node)>>(iter: I) -> Self {
        Self {
            items: iter.into_iter().map(|(topic, node)| (topic.into(), Ok(node))).collect(),
        }
    }
}

/// What a committed update changed, as topics relative to the root
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateOutcome {
    /// Entries written (added or changed)
    pub changed: Vec<String>,

    /// Entries deleted
    pub removed: Vec<String>,
}

impl UpdateOutcome {
    /// Whether the update left the store untouched
    pub fn is_noop(&self) -> bool {
        self.changed.is_empty() && self.removed.is_empty()
    }
}

/// Phases of one update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdatePhase {
    Staging,
    Validating,
    Persisting,
    Committed,
    Aborted,
}

fn enter(phase: &mut UpdatePhase, next: UpdatePhase) {
    let from = *phase;
    debug!(from = ?from, to = ?next, "update phase");
    *phase = next;
}

impl<T: ConfigRoot, S: KvStore> Manager<T, S> {
    /// Apply a batch of changes atomically
    ///
    /// Either every change is validated, persisted and committed, or the
    /// call fails and nothing observable changes.
    pub fn update(&self, changes: Changes) -> Result<UpdateOutcome> {
        let mut state = self.state.write();
        let mut phase = UpdatePhase::Staging;
        debug!(changes = changes.len(), "update started");

        match self.run(&mut state, changes, &mut phase) {
            Ok(outcome) => {
                enter(&mut phase, UpdatePhase::Committed);
                debug!(changed = outcome.changed.len(), removed = outcome.removed.len(), "update committed");
                Ok(outcome)
            }
            Err(e) => {
                let failed = phase;
                enter(&mut phase, UpdatePhase::Aborted);
                debug!(phase = ?failed, error = %e, "update aborted");
                Err(e)
            }
        }
    }

    fn run(&self, state: &mut State, changes: Changes, phase: &mut UpdatePhase) -> Result<UpdateOutcome> {
        // Staging
        let mut targets = Vec::with_capacity(changes.items.len());
        for (topic, _) in &changes.items {
            let path = state.index.resolve(topic).into_owned();
            if !addressable(&state.tree, &path) {
                return Err(ConfigError::not_found(topic.as_str()));
            }
            targets.push(path);
        }

        let mut staged = state.tree.clone();
        for ((topic, value), path) in changes.items.into_iter().zip(&targets) {
            let value = value.map_err(|e| ConfigError::mismatch(topic.as_str(), e.to_string()))?;
            codec::apply(&mut staged, path, value)?;
        }

        // Validating
        enter(phase, UpdatePhase::Validating);
        validate::cascade(state.index.sections(), &staged, &targets)?;

        let applied = codec::flatten(&staged);
        let normalized = normalize::<T>(staged)?;
        let entries = codec::flatten(&normalized);
        if let Some(lost) = applied.keys().find(|topic| !entries.contains_key(*topic)) {
            return Err(ConfigError::not_found(lost.as_str()));
        }

        let index = if normalized == state.tree {
            None
        } else {
            Some(TopicIndex::build(&normalized, state.index.sections().clone())?)
        };

        // Persisting
        enter(phase, UpdatePhase::Persisting);
        let diff = codec::diff(&state.entries, &entries);
        if !diff.is_empty() {
            write_diff(&self.store, &self.namespace, &diff, self.options.trace_entries)?;
        }

        // Committed
        state.tree = normalized;
        state.entries = entries;
        if let Some(index) = index {
            state.index = index;
        }
        Ok(UpdateOutcome {
            changed: diff.set.into_keys().collect(),
            removed: diff.removed,
        })
    }

    /// Replace every entry below `topic` with the given flat entries
    ///
    /// Entry topics are relative to `topic`. The subtree is rebuilt from an
    /// empty shape, so children the entries do not mention are removed.
    pub fn replace_entries(&self, topic: &str, entries: Entries) -> Result<UpdateOutcome> {
        let shape = self.get(topic)?.skeleton();
        let subtree = codec::unflatten(entries, shape)?;
        self.update(Changes::new().set_node(topic, subtree))
    }
}

/// Whether a path names an existing node or one staging may create
///
/// Missing mapping keys, fields below a null leaf and the next sequence
/// index can be created; anything below a new key is left to normalization
/// to judge.
fn addressable(tree: &Node, path: &str) -> bool {
    let mut node = tree;
    for segment in topic::segments(path) {
        match node.child(segment) {
            Some(child) => node = child,
            None => {
                return match node {
                    Node::Mapping(_) | Node::Scalar(Scalar::Null) => topic::valid_segment(segment),
                    Node::Sequence(items) => segment.parse::<usize>().map_or(false, |i| i == items.len()),
                    _ => false,
                }
            }
        }
    }
    true
}
