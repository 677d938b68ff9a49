//! Validator Cascade
//!
//! Runs the `validate` capability of every touched node against the staged
//! tree, deepest nodes first, and collects every failure.

use std::collections::BTreeSet;

use crate::error::{ConfigError, Result, ValidationErrors};
use crate::node::Node;
use crate::schema::Sections;
use crate::topic;

/// Validate the nodes an update touched
///
/// Touched means a change target, any ancestor of one, or any node inside a
/// target's staged subtree. A node that cannot be decoded into its section
/// type aborts with `TypeMismatch` at the leaf that failed; validator
/// rejections are gathered into a single `ConfigError::Validation`.
pub(crate) fn cascade(sections: &Sections, staged: &Node, targets: &[String]) -> Result<()> {
    let mut ordered: Vec<String> = touched(staged, targets).into_iter().collect();
    ordered.sort_by(|a, b| {
        topic::depth(b)
            .cmp(&topic::depth(a))
            .then_with(|| topic::natural_cmp(a, b))
    });

    let mut errors = ValidationErrors::default();
    for path in &ordered {
        let capability = match sections.find(path).and_then(|id| sections.capability(id)) {
            Some(capability) => capability,
            None => continue,
        };
        let node = match staged.lookup(path) {
            Some(node) => node,
            None => continue,
        };
        if let Err(message) = capability.validate(node, path)? {
            errors.push(path.as_str(), message);
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::Validation(errors))
    }
}

fn touched(staged: &Node, targets: &[String]) -> BTreeSet<String> {
    let mut touched = BTreeSet::new();
    for target in targets {
        let mut ancestor = topic::parent(target);
        while let Some(path) = ancestor {
            touched.insert(path.to_string());
            ancestor = topic::parent(path);
        }
        if let Some(node) = staged.lookup(target) {
            descendants(node, target.clone(), &mut touched);
        }
    }
    touched
}

fn descendants(node: &Node, path: String, out: &mut BTreeSet<String>) {
    for (segment, child) in node.children() {
        descendants(child, topic::join(&path, &segment), out);
    }
    out.insert(path);
}
