//! NodeRepository Trait - Storage Abstraction Layer
//!
//! This module defines the `NodeRepository` trait the mutation engine is
//! written against, and the `WriteBatch` it submits once per operation.
//!
//! # Architecture
//!
//! - **Abstraction Point**: Between `OutlineService` (ordering policy) and the
//!   row store (no policy)
//! - **Atomic batches**: `apply_batch` commits every write or none
//! - **Optimistic check**: a batch carries the sibling-group snapshots its
//!   plan was computed from; the store re-validates them inside the same
//!   critical section as the write and rejects stale plans with
//!   `StoreError::Conflict`
//!
//! # Examples
//!
//! ```rust,no_run
//! use outline_core::db::{MemoryRepository, NodeRepository, WriteBatch};
//! use outline_core::models::Node;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let repo = MemoryRepository::new();
//!     let node = Node::new("First".to_string(), None, None, 0);
//!     let committed = repo
//!         .apply_batch(WriteBatch::new().expect_group(None, &[]).insert(node))
//!         .await?;
//!     assert_eq!(committed.len(), 1);
//!     Ok(())
//! }
//! ```

use crate::db::StoreError;
use crate::models::{Node, NodePatch};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A single row write inside a batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum NodeWrite {
    /// Insert a brand new row (id must be unused)
    Insert { node: Node },

    /// Patch an existing row
    Update { id: String, patch: NodePatch },
}

impl NodeWrite {
    /// ID of the row this write targets
    pub fn id(&self) -> &str {
        match self {
            NodeWrite::Insert { node } => &node.id,
            NodeWrite::Update { id, .. } => id,
        }
    }
}

/// Snapshot of one sibling group as the plan saw it
///
/// `members` lists `(id, position)` pairs in position order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupExpectation {
    pub parent_id: Option<String>,
    pub members: Vec<(String, u32)>,
}

impl GroupExpectation {
    /// Capture the membership of `siblings` (already ordered by position)
    pub fn capture(parent_id: Option<&str>, siblings: &[Node]) -> Self {
        Self {
            parent_id: parent_id.map(str::to_string),
            members: siblings
                .iter()
                .map(|s| (s.id.clone(), s.position))
                .collect(),
        }
    }

    /// Check the snapshot against the current ordered group
    pub fn matches(&self, current: &[Node]) -> bool {
        self.members.len() == current.len()
            && self
                .members
                .iter()
                .zip(current)
                .all(|((id, position), node)| *id == node.id && *position == node.position)
    }
}

/// An all-or-nothing set of writes plus the group snapshots it depends on
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteBatch {
    pub writes: Vec<NodeWrite>,
    pub expectations: Vec<GroupExpectation>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an insert
    pub fn insert(mut self, node: Node) -> Self {
        self.writes.push(NodeWrite::Insert { node });
        self
    }

    /// Queue a patch, merging into an earlier update of the same row
    pub fn update(mut self, id: impl Into<String>, patch: NodePatch) -> Self {
        let id = id.into();
        let existing = self.writes.iter_mut().find_map(|w| match w {
            NodeWrite::Update { id: wid, patch } if *wid == id => Some(patch),
            _ => None,
        });
        match existing {
            Some(existing) => existing.merge(patch),
            None => self.writes.push(NodeWrite::Update { id, patch }),
        }
        self
    }

    /// Attach a group snapshot the store must re-validate before writing
    pub fn expect_group(mut self, parent_id: Option<&str>, siblings: &[Node]) -> Self {
        self.expectations
            .push(GroupExpectation::capture(parent_id, siblings));
        self
    }

    /// IDs written by this batch, in write order
    pub fn touched_ids(&self) -> Vec<&str> {
        self.writes.iter().map(NodeWrite::id).collect()
    }
}

/// Storage contract consumed by the mutation engine
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync` so the engine can be shared across
/// tasks behind an `Arc`.
#[async_trait]
pub trait NodeRepository: Send + Sync {
    /// Get node by ID (`Ok(None)` if it doesn't exist)
    async fn get(&self, id: &str) -> Result<Option<Node>, StoreError>;

    /// Ordered children of `parent_id` (`None` = root group)
    async fn children(&self, parent_id: Option<&str>) -> Result<Vec<Node>, StoreError>;

    /// Apply every write or none
    ///
    /// # Returns
    ///
    /// Committed state of each written row, one entry per distinct ID, in
    /// write order.
    ///
    /// # Errors
    ///
    /// - `Conflict` if any expectation no longer matches
    /// - `NotFound` if an update addresses a missing row
    /// - `Rejected` if the result would leave a dangling parent or duplicate id
    /// - `Unavailable` on backend failure
    async fn apply_batch(&self, batch: WriteBatch) -> Result<Vec<Node>, StoreError>;

    /// Total number of nodes
    async fn count(&self) -> Result<usize, StoreError>;
}
