//! Flattener / Unflattener
//!
//! Converts between a node tree and the flat set of `(topic, scalar)`
//! entries a backing store holds.
//!
//! ## Merge Rules
//! - A scalar written at a scalar topic is a leaf merge, coerced to the
//!   declared type of the existing leaf.
//! - Any value written at a container topic replaces that whole subtree.
//! - Missing mapping keys and the next sequence index are created on demand;
//!   missing record fields are not.
//! - A null leaf written below is turned into a mapping created on demand, so
//!   an `Option` that was `None` can be filled from its entries.
//!
//! ## Empty Containers
//! An empty mapping, sequence or record has no leaves, so it is flattened to
//! a single null entry at its own topic. Decoding reads that null back as an
//! empty container (or `None` for an optional one).

use std::collections::BTreeMap;

use crate::error::{ConfigError, Result};
use crate::node::{Node, Scalar};
use crate::topic;

/// Flat view of a tree, ordered by topic
pub type Entries = BTreeMap<String, Scalar>;

// =============================================================================
// Flatten
// =============================================================================

/// One entry per scalar leaf (or empty container), with topics relative to `node`
pub fn flatten(node: &Node) -> Entries {
    let mut entries = Entries::new();
    flatten_into(node, String::new(), &mut entries);
    entries
}

/// Flatten a subtree, prefixing its topics with `base`
pub fn flatten_at(node: &Node, base: &str) -> Entries {
    let mut entries = Entries::new();
    flatten_into(node, base.to_string(), &mut entries);
    entries
}

fn flatten_into(node: &Node, path: String, out: &mut Entries) {
    match node {
        Node::Scalar(scalar) => {
            out.insert(path, scalar.clone());
        }
        _ => {
            let children = node.children();
            if children.is_empty() {
                out.insert(path, Scalar::Null);
                return;
            }
            for (segment, child) in children {
                flatten_into(child, topic::join(&path, &segment), out);
            }
        }
    }
}

// =============================================================================
// Unflatten
// =============================================================================

/// Rebuild a tree by writing every entry into `shape`
///
/// Additive: children of `shape` that no entry mentions are kept. Pass
/// `shape.skeleton()` to rebuild containers purely from the entries.
pub fn unflatten<I>(entries: I, shape: Node) -> Result<Node>
where
    I: IntoIterator<Item = (String, Scalar)>,
{
    let mut entries: Vec<(String, Scalar)> = entries.into_iter().collect();
    entries.sort_by(|a, b| topic::natural_cmp(&a.0, &b.0));

    let mut tree = shape;
    for (topic, value) in entries {
        apply(&mut tree, &topic, Node::Scalar(value))?;
    }
    Ok(tree)
}

/// Write one value into the tree at `topic`
pub fn apply(tree: &mut Node, topic: &str, value: Node) -> Result<()> {
    let target = slot(tree, topic)?;
    let current = target.as_scalar().cloned();

    match (current, value) {
        (Some(current), Node::Scalar(incoming)) => {
            let coerced = incoming.coerce_like(&current).ok_or_else(|| {
                ConfigError::mismatch(
                    topic,
                    format!("expected {}, found {} {}", current.type_name(), incoming.type_name(), incoming),
                )
            })?;
            *target = Node::Scalar(coerced);
        }
        (Some(Scalar::Null), value) => *target = value,
        (Some(current), value) => {
            return Err(ConfigError::mismatch(
                topic,
                format!("expected {}, found {:?}", current.type_name(), value.kind()),
            ));
        }
        (None, Node::Scalar(incoming)) if !incoming.is_null() => {
            return Err(ConfigError::mismatch(
                topic,
                format!("expected {:?}, found {}", target.kind(), incoming.type_name()),
            ));
        }
        (None, value) => *target = value,
    }
    Ok(())
}

/// Node at `topic`, creating missing mapping keys and sequence tail elements
fn slot<'a>(tree: &'a mut Node, topic: &str) -> Result<&'a mut Node> {
    let segments: Vec<&str> = topic::segments(topic).collect();
    let mut node = tree;
    for (i, segment) in segments.iter().enumerate() {
        let placeholder = if i + 1 == segments.len() {
            Node::Scalar(Scalar::Null)
        } else {
            Node::empty_mapping()
        };
        node = descend(node, segment, topic, placeholder)?;
    }
    Ok(node)
}

fn descend<'a>(node: &'a mut Node, segment: &str, topic: &str, placeholder: Node) -> Result<&'a mut Node> {
    if !topic::valid_segment(segment) {
        return Err(ConfigError::not_found(topic));
    }
    if matches!(node, Node::Scalar(Scalar::Null)) {
        *node = Node::empty_mapping();
    }
    match node {
        Node::Record(fields) => fields
            .iter_mut()
            .find(|(name, _)| name == segment)
            .map(|(_, child)| child)
            .ok_or_else(|| ConfigError::not_found(topic)),
        Node::Mapping(entries) => Ok(entries.entry(segment.to_string()).or_insert(placeholder)),
        Node::Sequence(items) => {
            let index: usize = segment.parse().map_err(|_| ConfigError::not_found(topic))?;
            if index == items.len() {
                items.push(placeholder);
            }
            items.get_mut(index).ok_or_else(|| ConfigError::not_found(topic))
        }
        Node::Scalar(_) => Err(ConfigError::not_found(topic)),
    }
}

// =============================================================================
// Diff
// =============================================================================

/// Entry-level difference between two flat views
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Diff {
    /// Entries added or changed
    pub set: Entries,

    /// Topics present before and gone now
    pub removed: Vec<String>,
}

impl Diff {
    pub fn is_empty(&self) -> bool {
        self.set.is_empty() && self.removed.is_empty()
    }

    pub fn len(&self) -> usize {
        self.set.len() + self.removed.len()
    }
}

/// What must be written and deleted to turn `old` into `new`
pub fn diff(old: &Entries, new: &Entries) -> Diff {
    let set = new
        .iter()
        .filter(|(topic, value)| old.get(*topic) != Some(*value))
        .map(|(topic, value)| (topic.clone(), value.clone()))
        .collect();
    let removed = old
        .keys()
        .filter(|topic| !new.contains_key(*topic))
        .cloned()
        .collect();
    Diff { set, removed }
}

// =============================================================================
// Store Keys
// =============================================================================

/// Store key of a topic inside a namespace
pub fn store_key(namespace: &str, topic: &str) -> String {
    match (namespace.is_empty(), topic.is_empty()) {
        (true, _) => topic.to_string(),
        (false, true) => namespace.to_string(),
        (false, false) => topic::join(namespace, topic),
    }
}

/// Topic of a store key, `None` when the key lies outside the namespace
pub fn topic_of_key<'a>(namespace: &str, key: &'a str) -> Option<&'a str> {
    if namespace.is_empty() {
        return Some(key);
    }
    if key == namespace {
        return Some("");
    }
    key.strip_prefix(namespace)?.strip_prefix(topic::SEPARATOR)
}
