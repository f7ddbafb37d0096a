//! In-memory transactional repository
//!
//! `MemoryRepository` is the reference `NodeRepository`: rows live in a
//! `HashMap` behind a tokio `RwLock`, and `apply_batch` stages every write on
//! an overlay, validates expectations and integrity, then commits the overlay
//! in one step while still holding the write lock.
//!
//! It also carries fault injection hooks and call counters so engine and
//! projection tests can observe exactly how the store was used.

use crate::db::{NodeRepository, NodeWrite, StoreError, WriteBatch};
use crate::models::forest::group_label;
use crate::models::Node;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::RwLock;

pub struct MemoryRepository {
    nodes: RwLock<HashMap<String, Node>>,

    /// Batches that will fail with `Unavailable` before touching any row
    fail_next_batches: AtomicUsize,

    /// When set, every call fails with `Unavailable`
    unavailable: AtomicBool,

    committed_batches: AtomicUsize,
    children_calls: AtomicUsize,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::from_map(HashMap::new())
    }

    /// Pre-populate the store, bypassing batch validation
    pub fn with_nodes(nodes: Vec<Node>) -> Self {
        Self::from_map(nodes.into_iter().map(|n| (n.id.clone(), n)).collect())
    }

    fn from_map(nodes: HashMap<String, Node>) -> Self {
        Self {
            nodes: RwLock::new(nodes),
            fail_next_batches: AtomicUsize::new(0),
            unavailable: AtomicBool::new(false),
            committed_batches: AtomicUsize::new(0),
            children_calls: AtomicUsize::new(0),
        }
    }

    /// Make the next `count` batches fail with `Unavailable`
    pub fn fail_next_batches(&self, count: usize) {
        self.fail_next_batches.store(count, Ordering::SeqCst);
    }

    /// Toggle simulated transport outage for every call
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of batches committed so far
    pub fn committed_batches(&self) -> usize {
        self.committed_batches.load(Ordering::SeqCst)
    }

    /// Number of `children` calls served so far
    pub fn children_calls(&self) -> usize {
        self.children_calls.load(Ordering::SeqCst)
    }

    /// Every node currently stored (unordered)
    pub async fn snapshot(&self) -> Vec<Node> {
        self.nodes.read().await.values().cloned().collect()
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::unavailable("memory store offline"));
        }
        Ok(())
    }

    fn take_injected_failure(&self) -> bool {
        self.fail_next_batches
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl Default for MemoryRepository {
    fn default() -> Self {
        Self::new()
    }
}

fn ordered_group(nodes: &HashMap<String, Node>, parent_id: Option<&str>) -> Vec<Node> {
    let mut group: Vec<Node> = nodes
        .values()
        .filter(|n| n.parent_id.as_deref() == parent_id)
        .cloned()
        .collect();
    group.sort_by(|a, b| a.position.cmp(&b.position).then_with(|| a.id.cmp(&b.id)));
    group
}

/// Stage `writes` on top of `base` without mutating it
///
/// Returns the staged rows keyed by ID plus the distinct IDs in write order.
pub(crate) fn stage_writes(
    base: &HashMap<String, Node>,
    writes: &[NodeWrite],
) -> Result<(HashMap<String, Node>, Vec<String>), StoreError> {
    let mut staged: HashMap<String, Node> = HashMap::new();
    let mut order: Vec<String> = Vec::new();

    for write in writes {
        match write {
            NodeWrite::Insert { node } => {
                if base.contains_key(&node.id) || staged.contains_key(&node.id) {
                    return Err(StoreError::rejected(format!(
                        "duplicate node id '{}'",
                        node.id
                    )));
                }
                staged.insert(node.id.clone(), node.clone());
            }
            NodeWrite::Update { id, patch } => {
                let mut row = match staged.remove(id) {
                    Some(row) => row,
                    None => base
                        .get(id)
                        .cloned()
                        .ok_or_else(|| StoreError::not_found(id.clone()))?,
                };
                row.apply_patch(patch);
                staged.insert(id.clone(), row);
            }
        }
        if !order.iter().any(|seen| seen == write.id()) {
            order.push(write.id().to_string());
        }
    }

    Ok((staged, order))
}

/// Reject staged rows that would dangle or close a parent cycle
pub(crate) fn validate_integrity(
    base: &HashMap<String, Node>,
    staged: &HashMap<String, Node>,
) -> Result<(), StoreError> {
    let lookup = |id: &str| staged.get(id).or_else(|| base.get(id));

    for row in staged.values() {
        let mut seen: HashSet<&str> = HashSet::new();
        seen.insert(row.id.as_str());
        let mut cursor = row.parent_id.as_deref();

        while let Some(parent_id) = cursor {
            let parent = lookup(parent_id).ok_or_else(|| {
                StoreError::rejected(format!(
                    "node '{}' references missing parent '{}'",
                    row.id, parent_id
                ))
            })?;
            if !seen.insert(parent.id.as_str()) {
                return Err(StoreError::rejected(format!(
                    "moving node '{}' would create a cycle",
                    row.id
                )));
            }
            cursor = parent.parent_id.as_deref();
        }
    }
    Ok(())
}

#[async_trait]
impl NodeRepository for MemoryRepository {
    async fn get(&self, id: &str) -> Result<Option<Node>, StoreError> {
        self.check_available()?;
        Ok(self.nodes.read().await.get(id).cloned())
    }

    async fn children(&self, parent_id: Option<&str>) -> Result<Vec<Node>, StoreError> {
        self.check_available()?;
        self.children_calls.fetch_add(1, Ordering::SeqCst);
        let nodes = self.nodes.read().await;
        Ok(ordered_group(&nodes, parent_id))
    }

    async fn apply_batch(&self, batch: WriteBatch) -> Result<Vec<Node>, StoreError> {
        self.check_available()?;
        if self.take_injected_failure() {
            return Err(StoreError::unavailable("injected batch failure"));
        }

        let mut nodes = self.nodes.write().await;

        for expectation in &batch.expectations {
            let current = ordered_group(&nodes, expectation.parent_id.as_deref());
            if !expectation.matches(&current) {
                tracing::debug!(
                    "Rejecting stale batch: group {} changed",
                    group_label(expectation.parent_id.as_deref())
                );
                return Err(StoreError::conflict(format!(
                    "sibling group {} changed since it was read",
                    group_label(expectation.parent_id.as_deref())
                )));
            }
        }

        let (staged, order) = stage_writes(&nodes, &batch.writes)?;
        validate_integrity(&nodes, &staged)?;

        let mut committed = Vec::with_capacity(order.len());
        let mut staged = staged;
        for id in order {
            if let Some(row) = staged.remove(&id) {
                nodes.insert(id, row.clone());
                committed.push(row);
            }
        }

        self.committed_batches.fetch_add(1, Ordering::SeqCst);
        Ok(committed)
    }

    async fn count(&self) -> Result<usize, StoreError> {
        self.check_available()?;
        Ok(self.nodes.read().await.len())
    }
}
