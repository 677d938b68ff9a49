//! Node Module
//!
//! The dynamic form of a typed configuration tree.
//!
//! ## Node Kinds
//! - `Scalar`:   a leaf, the only thing persisted
//! - `Record`:   named fields of a struct, in declaration order
//! - `Mapping`:  keyed collection, keys become path segments
//! - `Sequence`: ordered collection, indices become path segments
//!
//! `reflect` turns any `Serialize` value into a `Node`; `from_node` decodes a
//! `Node` back into any `Deserialize` type. Together they bridge the typed
//! schema and the flat topic namespace without runtime type inspection.

mod de;
mod scalar;
mod ser;

use std::borrow::Cow;
use std::collections::BTreeMap;

use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};
use thiserror::Error;

use crate::topic;

pub use de::{from_node, from_node_at};
pub use scalar::Scalar;
pub use ser::reflect;

/// Error raised while converting between typed values and nodes
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct NodeError(pub(crate) String);

/// Structural kind of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Scalar,
    Record,
    Mapping,
    Sequence,
}

/// A node of the configuration tree
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Scalar(Scalar),
    Record(Vec<(String, Node)>),
    Mapping(BTreeMap<String, Node>),
    Sequence(Vec<Node>),
}

impl Node {
    /// An empty mapping, used for containers created on demand
    pub fn empty_mapping() -> Self {
        Node::Mapping(BTreeMap::new())
    }

    pub fn kind(&self) -> NodeKind {
        match self {
            Node::Scalar(_) => NodeKind::Scalar,
            Node::Record(_) => NodeKind::Record,
            Node::Mapping(_) => NodeKind::Mapping,
            Node::Sequence(_) => NodeKind::Sequence,
        }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self, Node::Scalar(_))
    }

    pub fn as_scalar(&self) -> Option<&Scalar> {
        match self {
            Node::Scalar(scalar) => Some(scalar),
            _ => None,
        }
    }

    /// Direct child addressed by one path segment
    pub fn child(&self, segment: &str) -> Option<&Node> {
        match self {
            Node::Scalar(_) => None,
            Node::Record(fields) => fields.iter().find(|(name, _)| name == segment).map(|(_, n)| n),
            Node::Mapping(entries) => entries.get(segment),
            Node::Sequence(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        }
    }

    pub fn child_mut(&mut self, segment: &str) -> Option<&mut Node> {
        match self {
            Node::Scalar(_) => None,
            Node::Record(fields) => fields
                .iter_mut()
                .find(|(name, _)| name == segment)
                .map(|(_, n)| n),
            Node::Mapping(entries) => entries.get_mut(segment),
            Node::Sequence(items) => segment.parse::<usize>().ok().and_then(move |i| items.get_mut(i)),
        }
    }

    /// Children with their path segments, in natural order
    pub fn children(&self) -> Vec<(Cow<'_, str>, &Node)> {
        match self {
            Node::Scalar(_) => Vec::new(),
            Node::Record(fields) => fields
                .iter()
                .map(|(name, node)| (Cow::Borrowed(name.as_str()), node))
                .collect(),
            Node::Mapping(entries) => entries
                .iter()
                .map(|(key, node)| (Cow::Borrowed(key.as_str()), node))
                .collect(),
            Node::Sequence(items) => items
                .iter()
                .enumerate()
                .map(|(i, node)| (Cow::Owned(i.to_string()), node))
                .collect(),
        }
    }

    /// Node at a topic relative to `self`
    pub fn lookup(&self, topic: &str) -> Option<&Node> {
        topic::segments(topic).try_fold(self, |node, segment| node.child(segment))
    }

    pub fn lookup_mut(&mut self, topic: &str) -> Option<&mut Node> {
        topic::segments(topic).try_fold(self, |node, segment| node.child_mut(segment))
    }

    /// Copy of the tree with every mapping and sequence emptied
    ///
    /// Records and scalars keep their declared shape; this is the target an
    /// unflatten starts from when rebuilding a tree purely from entries.
    pub fn skeleton(&self) -> Node {
        match self {
            Node::Scalar(scalar) => Node::Scalar(scalar.clone()),
            Node::Record(fields) => Node::Record(
                fields
                    .iter()
                    .map(|(name, node)| (name.clone(), node.skeleton()))
                    .collect(),
            ),
            Node::Mapping(_) => Node::empty_mapping(),
            Node::Sequence(_) => Node::Sequence(Vec::new()),
        }
    }
}

impl From<Scalar> for Node {
    fn from(scalar: Scalar) -> Self {
        Node::Scalar(scalar)
    }
}

/// Plain serde form: records and mappings as maps, scalars untagged
impl Serialize for Node {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Node::Scalar(Scalar::Null) => serializer.serialize_unit(),
            Node::Scalar(Scalar::Bool(b)) => serializer.serialize_bool(*b),
            Node::Scalar(Scalar::Int(i)) => serializer.serialize_i64(*i),
            Node::Scalar(Scalar::Float(f)) => serializer.serialize_f64(*f),
            Node::Scalar(Scalar::Str(s)) => serializer.serialize_str(s),
            Node::Record(fields) => {
                let mut map = serializer.serialize_map(Some(fields.len()))?;
                for (name, node) in fields {
                    map.serialize_entry(name, node)?;
                }
                map.end()
            }
            Node::Mapping(entries) => {
                let mut map = serializer.serialize_map(Some(entries.len()))?;
                for (key, node) in entries {
                    map.serialize_entry(key, node)?;
                }
                map.end()
            }
            Node::Sequence(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for node in items {
                    seq.serialize_element(node)?;
                }
                seq.end()
            }
        }
    }
}
