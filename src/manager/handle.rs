//! Typed section handles

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::de::DeserializeOwned;

use crate::error::{ConfigError, Result};
use crate::node::from_node_at;

use super::State;

/// Narrow typed view of one subtree of a manager
///
/// Holds the node's path, resolved once when the handle was created, and
/// shares the manager's lock. Every `load` returns an owned value decoded
/// from the current tree.
pub struct SectionHandle<V> {
    state: Arc<RwLock<State>>,
    path: String,
    _section: PhantomData<fn() -> V>,
}

impl<V: DeserializeOwned> SectionHandle<V> {
    pub(crate) fn new(state: Arc<RwLock<State>>, path: String) -> Self {
        Self {
            state,
            path,
            _section: PhantomData,
        }
    }

    /// Current value of the section
    ///
    /// Fails with `NotFound` once an update has removed the node.
    pub fn load(&self) -> Result<V> {
        let node = {
            let state = self.state.read();
            state
                .tree
                .lookup(&self.path)
                .cloned()
                .ok_or_else(|| ConfigError::not_found(self.path.as_str()))?
        };
        from_node_at(node, &self.path)
    }

    /// Topic the section currently resolves to (its override, if any)
    pub fn topic(&self) -> Option<String> {
        let state = self.state.read();
        state.index.lookup(&self.path).map(|descriptor| descriptor.topic.clone())
    }

    /// Structural path of the section
    pub fn path(&self) -> &str {
        &self.path
    }
}

impl<V> Clone for SectionHandle<V> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
            path: self.path.clone(),
            _section: PhantomData,
        }
    }
}

impl<V> fmt::Debug for SectionHandle<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SectionHandle")
            .field("path", &self.path)
            .field("section", &std::any::type_name::<V>())
            .finish()
    }
}
