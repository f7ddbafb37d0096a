//! Forest invariant checking
//!
//! Validates a full snapshot of the outline against the structural rules every
//! committed mutation must preserve: dense positions per sibling group,
//! acyclic parentage, resolvable parent references and unique ids.

use crate::models::Node;
use std::collections::{HashMap, HashSet};
use thiserror::Error;

/// A structural rule broken by a forest snapshot
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InvariantViolation {
    /// Two nodes share one id
    #[error("Duplicate node id: {id}")]
    DuplicateId { id: String },

    /// A parent reference points at a node that does not exist
    #[error("Node '{node_id}' references missing parent '{parent_id}'")]
    DanglingParent { node_id: String, parent_id: String },

    /// A node is its own ancestor
    #[error("Cycle detected through node '{node_id}'")]
    Cycle { node_id: String },

    /// A sibling group's positions are not exactly 0..n-1
    #[error("Sibling group {group} is not dense: positions {positions:?}")]
    NonDenseGroup {
        group: String,
        positions: Vec<u32>,
    },
}

/// Human-readable label for a sibling group key
pub fn group_label(parent_id: Option<&str>) -> String {
    match parent_id {
        Some(id) => format!("'{}'", id),
        None => "<root>".to_string(),
    }
}

/// Check every forest invariant over `nodes`
///
/// Returns the first violation found. Order of checks: unique ids, parent
/// references, acyclicity, dense positions.
pub fn check_invariants(nodes: &[Node]) -> Result<(), InvariantViolation> {
    let mut by_id: HashMap<&str, &Node> = HashMap::with_capacity(nodes.len());
    for node in nodes {
        if by_id.insert(node.id.as_str(), node).is_some() {
            return Err(InvariantViolation::DuplicateId {
                id: node.id.clone(),
            });
        }
    }

    check_references(&by_id)?;
    check_acyclic(&by_id)?;

    let mut groups: HashMap<Option<&str>, Vec<u32>> = HashMap::new();
    for node in nodes {
        groups
            .entry(node.parent_id.as_deref())
            .or_default()
            .push(node.position);
    }
    for (parent, mut positions) in groups {
        positions.sort_unstable();
        if !crate::operations::SiblingOrder::is_dense(&positions) {
            return Err(InvariantViolation::NonDenseGroup {
                group: group_label(parent),
                positions,
            });
        }
    }

    Ok(())
}

/// Every non-null parent reference must resolve (invariant 3)
pub fn check_references(by_id: &HashMap<&str, &Node>) -> Result<(), InvariantViolation> {
    for node in by_id.values() {
        if let Some(parent_id) = node.parent_id.as_deref() {
            if !by_id.contains_key(parent_id) {
                return Err(InvariantViolation::DanglingParent {
                    node_id: node.id.clone(),
                    parent_id: parent_id.to_string(),
                });
            }
        }
    }
    Ok(())
}

/// No node may be its own ancestor (invariant 2)
pub fn check_acyclic(by_id: &HashMap<&str, &Node>) -> Result<(), InvariantViolation> {
    let mut known_acyclic: HashSet<&str> = HashSet::with_capacity(by_id.len());

    for start in by_id.keys() {
        let mut path: HashSet<&str> = HashSet::new();
        let mut cursor = Some(*start);

        while let Some(id) = cursor {
            if known_acyclic.contains(id) {
                break;
            }
            if !path.insert(id) {
                return Err(InvariantViolation::Cycle {
                    node_id: id.to_string(),
                });
            }
            cursor = by_id.get(id).and_then(|n| n.parent_id.as_deref());
        }

        known_acyclic.extend(path);
    }

    Ok(())
}
