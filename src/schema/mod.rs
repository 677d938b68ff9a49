//! Schema Module
//!
//! Per-node capabilities and the topic index.
//!
//! ## Capabilities
//! A type opts into topic overriding and validation by implementing
//! [`Section`]. The root type additionally implements [`ConfigRoot`] and
//! registers where in the tree each section type lives:
//!
//! ```ignore
//! impl ConfigRoot for Config {
//!     const NAME: &'static str = "config";
//!
//!     fn sections(sections: &mut Sections) {
//!         sections
//!             .register::<ServerConfig>("server")
//!             .register::<DatabaseConfig>("system.database.*");
//!     }
//! }
//! ```
//!
//! Patterns are topics in which `*` matches any one segment. Capabilities are
//! resolved once per node when the index is built, never per update.

mod index;

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::Result;
use crate::node::{from_node, from_node_at, Node, NodeError};
use crate::topic;

pub use index::{NodeDescriptor, NodeId, TopicIndex};

/// A configuration type with optional addressing and validation behaviour
pub trait Section: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Topic override for this node
    ///
    /// Must be deterministic given the value, non-empty and free of the
    /// separator. The node stays reachable by its path as well.
    fn topic(&self) -> Option<String> {
        None
    }

    /// Check the staged value before an update commits
    fn validate(&self) -> std::result::Result<(), String> {
        Ok(())
    }
}

/// The root configuration type handed to a manager
pub trait ConfigRoot: Section {
    /// Default namespace of the root's entries in the backing store
    const NAME: &'static str;

    /// Attach section types to paths below the root
    fn sections(_sections: &mut Sections) {}
}

/// Type-erased capability of one section type
pub(crate) trait Capability: Send + Sync {
    fn type_name(&self) -> &'static str;

    /// Decode the node and return its topic override
    fn topic(&self, node: &Node) -> std::result::Result<Option<String>, NodeError>;

    /// Decode the node found at `path` and run its validator
    ///
    /// A decode failure is a `TypeMismatch` at the offending leaf.
    fn validate(&self, node: &Node, path: &str) -> Result<std::result::Result<(), String>>;
}

struct Typed<S>(PhantomData<fn() -> S>);

impl<S: Section> Capability for Typed<S> {
    fn type_name(&self) -> &'static str {
        std::any::type_name::<S>()
    }

    fn topic(&self, node: &Node) -> std::result::Result<Option<String>, NodeError> {
        Ok(from_node::<S>(node.clone())?.topic())
    }

    fn validate(&self, node: &Node, path: &str) -> Result<std::result::Result<(), String>> {
        Ok(from_node_at::<S>(node.clone(), path)?.validate())
    }
}

/// Registry of section types by path pattern
#[derive(Clone, Default)]
pub struct Sections {
    entries: Vec<(String, Arc<dyn Capability>)>,
}

impl Sections {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry for a root type: the root itself plus everything it declares
    pub fn for_root<T: ConfigRoot>() -> Self {
        let mut sections = Self::new();
        sections.register::<T>("");
        T::sections(&mut sections);
        sections
    }

    /// Attach section type `S` to every node whose path matches `pattern`
    ///
    /// Registering the same pattern twice replaces the earlier type.
    pub fn register<S: Section>(&mut self, pattern: &str) -> &mut Self {
        let capability: Arc<dyn Capability> = Arc::new(Typed::<S>(PhantomData));
        match self.entries.iter_mut().find(|(p, _)| p == pattern) {
            Some(entry) => entry.1 = capability,
            None => self.entries.push((pattern.to_string(), capability)),
        }
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Most specific registered pattern matching `path` (fewest wildcards)
    pub(crate) fn find(&self, path: &str) -> Option<usize> {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, (pattern, _))| topic::matches_pattern(pattern, path))
            .min_by_key(|(i, (pattern, _))| {
                let wildcards = topic::segments(pattern).filter(|s| *s == topic::WILDCARD).count();
                (wildcards, *i)
            })
            .map(|(i, _)| i)
    }

    pub(crate) fn capability(&self, id: usize) -> Option<&dyn Capability> {
        self.entries.get(id).map(|(_, capability)| capability.as_ref())
    }

    pub(crate) fn pattern(&self, id: usize) -> Option<&str> {
        self.entries.get(id).map(|(pattern, _)| pattern.as_str())
    }
}

impl fmt::Debug for Sections {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.entries.iter().map(|(p, c)| (p, c.type_name())))
            .finish()
    }
}
