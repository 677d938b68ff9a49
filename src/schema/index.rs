//! Topic Index
//!
//! Built by walking a node tree once. Every addressable node gets a
//! descriptor in an arena; lookups go through path and alias tables.

use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{ConfigError, Result};
use crate::node::{Node, NodeKind};
use crate::topic;

use super::{Capability, Sections};

/// Handle of a node descriptor inside one index
pub type NodeId = usize;

/// Everything the manager needs to know about one node
#[derive(Debug, Clone)]
pub struct NodeDescriptor {
    /// Structural topic (dotted path from the root)
    pub path: String,

    /// Resolved topic: the override when the node has one, else the path
    pub topic: String,

    pub parent: Option<NodeId>,
    pub kind: NodeKind,
    pub depth: usize,

    /// Registered section type, if any
    pub(crate) section: Option<usize>,
}

/// Index of every live node of a tree
#[derive(Debug, Clone)]
pub struct TopicIndex {
    nodes: Vec<NodeDescriptor>,
    by_path: HashMap<String, NodeId>,
    by_alias: HashMap<String, NodeId>,
    sections: Arc<Sections>,
}

impl TopicIndex {
    /// Walk `root` and index it
    ///
    /// Fails on a malformed segment, a node that cannot be decoded into its
    /// registered section type, or a topic override that names another node.
    pub fn build(root: &Node, sections: Arc<Sections>) -> Result<Self> {
        let mut index = Self {
            nodes: Vec::new(),
            by_path: HashMap::new(),
            by_alias: HashMap::new(),
            sections,
        };
        index.visit(root, String::new(), None)?;
        index.register_aliases()?;
        Ok(index)
    }

    fn visit(&mut self, node: &Node, path: String, parent: Option<NodeId>) -> Result<()> {
        let id = self.nodes.len();
        if self.by_path.insert(path.clone(), id).is_some() {
            return Err(ConfigError::schema(path, "duplicate topic"));
        }

        let section = self.sections.find(&path);
        let mut resolved = path.clone();
        if let Some(capability) = section.and_then(|s| self.sections.capability(s)) {
            let alias = capability.topic(node).map_err(|e| {
                ConfigError::schema(
                    &path,
                    format!("cannot decode {:?} node as {}: {}", node.kind(), capability.type_name(), e),
                )
            })?;
            if let Some(alias) = alias {
                if !topic::valid_segment(&alias) {
                    return Err(ConfigError::schema(
                        &path,
                        format!("topic override '{}' is empty or contains '{}'", alias, topic::SEPARATOR),
                    ));
                }
                resolved = alias;
            }
        }

        self.nodes.push(NodeDescriptor {
            path: path.clone(),
            topic: resolved,
            parent,
            kind: node.kind(),
            depth: topic::depth(&path),
            section,
        });

        for (segment, child) in node.children() {
            if !topic::valid_segment(&segment) {
                return Err(ConfigError::schema(
                    topic::join(&path, &segment),
                    format!("path segment is empty or contains '{}'", topic::SEPARATOR),
                ));
            }
            self.visit(child, topic::join(&path, &segment), Some(id))?;
        }
        Ok(())
    }

    fn register_aliases(&mut self) -> Result<()> {
        for (id, descriptor) in self.nodes.iter().enumerate() {
            if descriptor.topic == descriptor.path {
                continue;
            }
            let taken_by_path = self.by_path.get(&descriptor.topic).map_or(false, |other| *other != id);
            if taken_by_path || self.by_alias.contains_key(&descriptor.topic) {
                return Err(ConfigError::schema(
                    &descriptor.path,
                    format!("duplicate topic '{}'", descriptor.topic),
                ));
            }
            self.by_alias.insert(descriptor.topic.clone(), id);
        }
        Ok(())
    }

    // =========================================================================
    // Lookups
    // =========================================================================

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, id: NodeId) -> Option<&NodeDescriptor> {
        self.nodes.get(id)
    }

    pub fn id_of_path(&self, path: &str) -> Option<NodeId> {
        self.by_path.get(path).copied()
    }

    /// Descriptor of a topic given either as a path or an override
    pub fn lookup(&self, topic: &str) -> Option<&NodeDescriptor> {
        let id = self.id_of_path(&self.resolve(topic))?;
        self.nodes.get(id)
    }

    /// Rewrite a leading override segment into its path
    ///
    /// `database:db2.port` becomes `system.database.db2.port` when
    /// `database:db2` overrides `system.database.db2`. Topics that are
    /// already paths are returned unchanged.
    pub fn resolve<'a>(&self, topic: &'a str) -> Cow<'a, str> {
        if self.by_path.contains_key(topic) {
            return Cow::Borrowed(topic);
        }
        let (head, rest) = match topic.find(topic::SEPARATOR) {
            Some(pos) => (&topic[..pos], Some(&topic[pos + 1..])),
            None => (topic, None),
        };
        match self.by_alias.get(head).map(|id| &self.nodes[*id].path) {
            Some(path) => match rest {
                Some(rest) => Cow::Owned(topic::join(path, rest)),
                None => Cow::Owned(path.clone()),
            },
            None => Cow::Borrowed(topic),
        }
    }

    /// All descriptors in walk order (parents before children)
    pub fn iter(&self) -> impl Iterator<Item = &NodeDescriptor> {
        self.nodes.iter()
    }

    /// Paths of every indexed node
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.nodes.iter().map(|d| d.path.as_str())
    }

    /// Override topics and the paths they stand for
    pub fn aliases(&self) -> impl Iterator<Item = (&str, &str)> {
        self.by_alias
            .iter()
            .map(|(alias, id)| (alias.as_str(), self.nodes[*id].path.as_str()))
    }

    pub(crate) fn sections(&self) -> &Arc<Sections> {
        &self.sections
    }

    /// Capability attached to the node at `path`
    pub(crate) fn capability(&self, path: &str) -> Option<&dyn Capability> {
        let section = self.nodes.get(self.id_of_path(path)?)?.section?;
        self.sections.capability(section)
    }

    /// Pattern the node at `path` was matched with
    pub fn section_pattern(&self, path: &str) -> Option<&str> {
        let section = self.nodes.get(self.id_of_path(path)?)?.section?;
        self.sections.pattern(section)
    }
}
