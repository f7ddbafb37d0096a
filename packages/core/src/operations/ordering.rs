use crate::models::Node;
use serde::{Deserialize, Serialize};

/// A single renumbering write: `id` moves to `position`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionUpdate {
    pub id: String,
    pub position: u32,
}

/// Calculates the position deltas for a node leaving or entering a sibling group
pub struct SiblingOrder;

impl SiblingOrder {
    /// Shift every sibling after `removed_position` down by one
    ///
    /// # Example
    /// ```
    /// # use outline_core::models::Node;
    /// # use outline_core::operations::SiblingOrder;
    /// let group: Vec<Node> = (0..4)
    ///     .map(|i| Node::new_with_id(format!("n{i}"), String::new(), None, None, i))
    ///     .collect();
    /// // n1 leaves: n2 -> 1, n3 -> 2
    /// let updates = SiblingOrder::close_gap(&group, 1);
    /// assert_eq!(updates.len(), 2);
    /// assert_eq!(updates[0].position, 1);
    /// ```
    pub fn close_gap(siblings: &[Node], removed_position: u32) -> Vec<PositionUpdate> {
        siblings
            .iter()
            .filter(|s| s.position > removed_position)
            .map(|s| PositionUpdate {
                id: s.id.clone(),
                position: s.position - 1,
            })
            .collect()
    }

    /// Shift every sibling at or after `insert_position` up by one
    pub fn open_gap(siblings: &[Node], insert_position: u32) -> Vec<PositionUpdate> {
        siblings
            .iter()
            .filter(|s| s.position >= insert_position)
            .map(|s| PositionUpdate {
                id: s.id.clone(),
                position: s.position + 1,
            })
            .collect()
    }

    /// Append slot for a group
    pub fn next_position(siblings: &[Node]) -> u32 {
        siblings.len() as u32
    }

    /// Check that sorted positions are exactly `0..n-1`
    pub fn is_dense(sorted_positions: &[u32]) -> bool {
        sorted_positions
            .iter()
            .enumerate()
            .all(|(i, &p)| p as usize == i)
    }
}
