use crate::models::Node;
use serde::{Deserialize, Serialize};

/// Result of a committed structural mutation
///
/// `nodes` holds the committed state of every row the batch wrote.
/// `affected_groups` names every sibling group (by parent key, `None` = root
/// group) whose membership or ordering changed, including the group the moved
/// node left. View layers invalidate exactly these groups.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeSet {
    pub nodes: Vec<Node>,
    pub affected_groups: Vec<Option<String>>,
}

impl ChangeSet {
    pub fn new(nodes: Vec<Node>) -> Self {
        Self {
            nodes,
            affected_groups: Vec::new(),
        }
    }

    /// Record an affected group (deduplicated)
    pub fn with_group(mut self, parent_id: Option<&str>) -> Self {
        if !self.touches_group(parent_id) {
            self.affected_groups.push(parent_id.map(str::to_string));
        }
        self
    }

    /// Committed state of `id`, if the batch wrote it
    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn touches_group(&self, parent_id: Option<&str>) -> bool {
        self.affected_groups
            .iter()
            .any(|g| g.as_deref() == parent_id)
    }
}
