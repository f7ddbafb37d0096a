//! Outline Service - Tree Mutation Engine
//!
//! This module owns every mutation of the outline forest:
//!
//! - Creation (`create_node`, `create_child`, `seed_if_empty`)
//! - In-place edits (`set_expanded`, `update_content`)
//! - Structural moves (`indent`, `outdent`)
//! - Reads (`get_node`, `get_roots`, `get_children`, `child_count`)
//!
//! # Atomicity
//!
//! Every mutation validates its preconditions first, then builds exactly one
//! `WriteBatch` and commits it with a single `apply_batch` call. A failed
//! precondition returns before any batch exists, so nothing is written.
//!
//! # Stale Plans
//!
//! Plans are computed from reads taken outside the store's critical section.
//! Each batch carries a `GroupExpectation` for every sibling group it
//! renumbers; the store re-checks those inside its critical section and
//! rejects the batch with `StorageConflict` if a concurrent writer got there
//! first. The service never retries on its own; see `ConflictRetryQueue`.

use crate::config::EngineConfig;
use crate::db::{NodeRepository, OutlineEvent, WriteBatch};
use crate::models::{forest::group_label, ChangeSet, Language, Node, NodePatch};
use crate::operations::SiblingOrder;
use crate::services::error::{InvalidOperationReason, OutlineError};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Tree mutation engine over an abstract `NodeRepository`
///
/// Holds no cross-call state besides the event channel; clones share the
/// repository and the channel.
#[derive(Clone)]
pub struct OutlineService {
    repo: Arc<dyn NodeRepository>,
    config: Arc<EngineConfig>,
    event_tx: broadcast::Sender<OutlineEvent>,
}

impl OutlineService {
    /// Create a service with the default configuration
    ///
    /// # Examples
    ///
    /// ```
    /// # use outline_core::db::MemoryRepository;
    /// # use outline_core::services::OutlineService;
    /// # use std::sync::Arc;
    /// # #[tokio::main]
    /// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// let service = OutlineService::new(Arc::new(MemoryRepository::new()));
    /// let root = service.create_node(None, "Inbox".to_string(), None).await?;
    /// assert_eq!(root.position, 0);
    /// # Ok(())
    /// # }
    /// ```
    pub fn new(repo: Arc<dyn NodeRepository>) -> Self {
        Self::with_config(repo, EngineConfig::default())
    }

    pub fn with_config(repo: Arc<dyn NodeRepository>, config: EngineConfig) -> Self {
        // broadcast::channel panics on zero capacity
        let (event_tx, _) = broadcast::channel(config.event_channel_capacity.max(1));

        Self {
            repo,
            config: Arc::new(config),
            event_tx,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn repository(&self) -> &Arc<dyn NodeRepository> {
        &self.repo
    }

    /// Subscribe to domain events
    ///
    /// Every committed batch broadcasts its events after the commit. Most
    /// batches produce one event; `create_node` with
    /// `EngineConfig::expand_parent_on_create` follows `NodeCreated` with a
    /// `NodeUpdated` for the parent. Receivers created after a commit do not
    /// see it.
    pub fn subscribe(&self) -> broadcast::Receiver<OutlineEvent> {
        self.event_tx.subscribe()
    }

    /// Ignores send errors (no subscribers is a normal state)
    fn emit_event(&self, event: OutlineEvent) {
        let _ = self.event_tx.send(event);
    }

    async fn require_node(&self, id: &str) -> Result<Node, OutlineError> {
        self.repo
            .get(id)
            .await?
            .ok_or_else(|| OutlineError::node_not_found(id))
    }

    /// Commit one batch, logging failures before they propagate
    async fn commit(&self, operation: &str, batch: WriteBatch) -> Result<Vec<Node>, OutlineError> {
        tracing::debug!(
            "{}: committing writes to {:?} guarded by {} group snapshot(s)",
            operation,
            batch.touched_ids(),
            batch.expectations.len()
        );

        self.repo.apply_batch(batch).await.map_err(|e| {
            let err = OutlineError::from(e);
            if err.is_retryable() {
                tracing::warn!("{} rejected as stale: {}", operation, err);
            } else {
                tracing::error!("{} failed: {}", operation, err);
            }
            err
        })
    }

    fn committed_row(committed: &[Node], id: &str) -> Result<Node, OutlineError> {
        committed.iter().find(|n| n.id == id).cloned().ok_or_else(|| {
            OutlineError::IntegrityViolation(format!("batch did not return row '{}'", id))
        })
    }

    /// Create a node as the last child of `parent_id` (`None` = new root)
    ///
    /// The new node starts expanded. The parent's own expansion flag is left
    /// alone unless `EngineConfig::expand_parent_on_create` is set.
    ///
    /// # Errors
    ///
    /// - `ParentNotFound` if `parent_id` names a missing node
    pub async fn create_node(
        &self,
        parent_id: Option<&str>,
        content: String,
        content_alt: Option<String>,
    ) -> Result<Node, OutlineError> {
        let parent = match parent_id {
            Some(pid) => Some(
                self.repo
                    .get(pid)
                    .await?
                    .ok_or_else(|| OutlineError::parent_not_found(pid))?,
            ),
            None => None,
        };

        let siblings = self.repo.children(parent_id).await?;
        let node = Node::new(
            content,
            content_alt,
            parent_id.map(str::to_string),
            SiblingOrder::next_position(&siblings),
        );
        let node_id = node.id.clone();

        let mut batch = WriteBatch::new()
            .expect_group(parent_id, &siblings)
            .insert(node);

        let expand_parent = parent
            .as_ref()
            .filter(|p| self.config.expand_parent_on_create && !p.is_expanded)
            .map(|p| p.id.clone());
        if let Some(pid) = &expand_parent {
            batch = batch.update(pid.clone(), NodePatch::new().with_expanded(true));
        }

        let committed = self.commit("create_node", batch).await?;
        let created = Self::committed_row(&committed, &node_id)?;

        tracing::debug!(
            "Created node '{}' at position {} of group {}",
            created.id,
            created.position,
            group_label(parent_id)
        );

        self.emit_event(OutlineEvent::NodeCreated(created.clone()));
        if let Some(pid) = expand_parent {
            self.emit_event(OutlineEvent::NodeUpdated(Self::committed_row(
                &committed, &pid,
            )?));
        }

        Ok(created)
    }

    /// The editor's "add child" affordance: append a placeholder child
    pub async fn create_child(&self, parent_id: &str) -> Result<Node, OutlineError> {
        self.create_node(
            Some(parent_id),
            self.config.placeholder_content.clone(),
            Some(self.config.placeholder_content_alt.clone()),
        )
        .await
    }

    /// Create the welcome root when the outline is empty
    ///
    /// Returns `None` if any node already exists.
    pub async fn seed_if_empty(&self) -> Result<Option<Node>, OutlineError> {
        if self.repo.count().await? > 0 {
            return Ok(None);
        }

        tracing::info!("Outline is empty, seeding welcome node");
        let node = self
            .create_node(
                None,
                self.config.welcome_content.clone(),
                Some(self.config.welcome_content_alt.clone()),
            )
            .await?;
        Ok(Some(node))
    }

    /// Persist the expand/collapse flag
    ///
    /// Writing the current value returns the node without issuing a batch.
    pub async fn set_expanded(&self, id: &str, expanded: bool) -> Result<Node, OutlineError> {
        let node = self.require_node(id).await?;
        if node.is_expanded == expanded {
            return Ok(node);
        }

        let batch = WriteBatch::new().update(id, NodePatch::new().with_expanded(expanded));
        let committed = self.commit("set_expanded", batch).await?;
        let updated = Self::committed_row(&committed, id)?;

        self.emit_event(OutlineEvent::NodeUpdated(updated.clone()));
        Ok(updated)
    }

    /// Write the text stored for `language`, leaving the other field untouched
    ///
    /// Writing the current text returns the node without issuing a batch.
    pub async fn update_content(
        &self,
        id: &str,
        language: Language,
        text: String,
    ) -> Result<Node, OutlineError> {
        let node = self.require_node(id).await?;
        if node.stored_content(language) == Some(text.as_str()) {
            return Ok(node);
        }

        let batch = WriteBatch::new().update(id, NodePatch::new().with_content(language, text));
        let committed = self.commit("update_content", batch).await?;
        let updated = Self::committed_row(&committed, id)?;

        tracing::debug!("Updated {} content of node '{}'", language, id);
        self.emit_event(OutlineEvent::NodeUpdated(updated.clone()));
        Ok(updated)
    }

    /// Demote a node to the last child of the sibling directly above it
    ///
    /// The vacated slot is closed, the node is appended to the new parent's
    /// children, and the new parent is expanded so the node stays visible.
    ///
    /// # Errors
    ///
    /// - `NodeNotFound` if `id` is missing
    /// - `InvalidOperation(FirstRoot)` for the root at position 0
    /// - `InvalidOperation(NoSiblingAbove)` for any other first child
    /// - `StorageConflict` if either group changed after it was read
    pub async fn indent(&self, id: &str) -> Result<ChangeSet, OutlineError> {
        let node = self.require_node(id).await?;
        let old_parent = node.parent_id.as_deref();
        let siblings = self.repo.children(old_parent).await?;
        let position = Self::member(&siblings, &node.id, old_parent)?.position;

        let above = match siblings
            .iter()
            .filter(|s| s.position < position)
            .max_by_key(|s| s.position)
        {
            Some(above) => above.clone(),
            None => {
                let reason = if node.is_root() {
                    InvalidOperationReason::FirstRoot
                } else {
                    InvalidOperationReason::NoSiblingAbove
                };
                tracing::warn!("Refusing to indent '{}': {}", id, reason);
                return Err(OutlineError::invalid_operation(id, reason));
            }
        };

        let above_children = self.repo.children(Some(above.id.as_str())).await?;
        let new_position = SiblingOrder::next_position(&above_children);

        let mut batch = WriteBatch::new()
            .expect_group(old_parent, &siblings)
            .expect_group(Some(above.id.as_str()), &above_children);
        for update in SiblingOrder::close_gap(&siblings, position) {
            batch = batch.update(update.id, NodePatch::new().with_position(update.position));
        }
        batch = batch
            .update(
                id,
                NodePatch::new()
                    .with_parent(Some(above.id.clone()))
                    .with_position(new_position),
            )
            .update(above.id.clone(), NodePatch::new().with_expanded(true));

        let committed = self.commit("indent", batch).await?;
        let changes = ChangeSet::new(committed)
            .with_group(old_parent)
            .with_group(Some(above.id.as_str()));

        tracing::info!(
            "Indented '{}' under '{}' at position {}",
            id,
            above.id,
            new_position
        );
        self.emit_event(OutlineEvent::StructureChanged(changes.clone()));
        Ok(changes)
    }

    /// Promote a node to the sibling directly after its former parent
    ///
    /// # Errors
    ///
    /// - `NodeNotFound` if `id` is missing
    /// - `InvalidOperation(AlreadyRoot)` if the node has no parent
    /// - `StorageConflict` if either group changed after it was read
    pub async fn outdent(&self, id: &str) -> Result<ChangeSet, OutlineError> {
        let node = self.require_node(id).await?;
        let parent_id = match node.parent_id.clone() {
            Some(pid) => pid,
            None => {
                let reason = InvalidOperationReason::AlreadyRoot;
                tracing::warn!("Refusing to outdent '{}': {}", id, reason);
                return Err(OutlineError::invalid_operation(id, reason));
            }
        };

        let parent = self.repo.get(&parent_id).await?.ok_or_else(|| {
            OutlineError::IntegrityViolation(format!(
                "node '{}' references missing parent '{}'",
                id, parent_id
            ))
        })?;
        let grand = parent.parent_id.as_deref();

        let old_group = self.repo.children(Some(parent_id.as_str())).await?;
        let position = Self::member(&old_group, &node.id, Some(parent_id.as_str()))?.position;
        let grand_group = self.repo.children(grand).await?;
        let parent_position = Self::member(&grand_group, &parent.id, grand)?.position;

        let new_position = grand_group
            .iter()
            .filter(|s| s.position > parent_position)
            .map(|s| s.position)
            .min()
            .unwrap_or(parent_position + 1);

        let mut batch = WriteBatch::new()
            .expect_group(Some(parent_id.as_str()), &old_group)
            .expect_group(grand, &grand_group);
        for update in SiblingOrder::close_gap(&old_group, position) {
            batch = batch.update(update.id, NodePatch::new().with_position(update.position));
        }
        for update in SiblingOrder::open_gap(&grand_group, new_position) {
            batch = batch.update(update.id, NodePatch::new().with_position(update.position));
        }
        batch = batch.update(
            id,
            NodePatch::new()
                .with_parent(grand.map(str::to_string))
                .with_position(new_position),
        );

        let committed = self.commit("outdent", batch).await?;
        let changes = ChangeSet::new(committed)
            .with_group(Some(parent_id.as_str()))
            .with_group(grand);

        tracing::info!(
            "Outdented '{}' from '{}' into group {} at position {}",
            id,
            parent_id,
            group_label(grand),
            new_position
        );
        self.emit_event(OutlineEvent::StructureChanged(changes.clone()));
        Ok(changes)
    }

    /// Entry of `id` in a freshly read group
    ///
    /// Plans take positions from this entry rather than from an earlier
    /// `get`, so they agree with the snapshot the batch is guarded by. A node
    /// missing from the group it claims to belong to means the reads
    /// straddled a concurrent move.
    fn member<'a>(
        group: &'a [Node],
        id: &str,
        parent_id: Option<&str>,
    ) -> Result<&'a Node, OutlineError> {
        group.iter().find(|n| n.id == id).ok_or_else(|| {
            OutlineError::storage_conflict(format!(
                "node '{}' left group {} while the plan was built",
                id,
                group_label(parent_id)
            ))
        })
    }

    /// Get a node by ID (`Ok(None)` if it doesn't exist)
    pub async fn get_node(&self, id: &str) -> Result<Option<Node>, OutlineError> {
        Ok(self.repo.get(id).await?)
    }

    /// Root nodes ordered by position
    pub async fn get_roots(&self) -> Result<Vec<Node>, OutlineError> {
        Ok(self.repo.children(None).await?)
    }

    /// Children of `parent_id` ordered by position
    ///
    /// # Errors
    ///
    /// - `ParentNotFound` if `parent_id` is missing
    pub async fn get_children(&self, parent_id: &str) -> Result<Vec<Node>, OutlineError> {
        if self.repo.get(parent_id).await?.is_none() {
            return Err(OutlineError::parent_not_found(parent_id));
        }
        Ok(self.repo.children(Some(parent_id)).await?)
    }

    /// Number of direct children of `id`
    pub async fn child_count(&self, id: &str) -> Result<usize, OutlineError> {
        self.require_node(id).await?;
        Ok(self.repo.children(Some(id)).await?.len())
    }
}

// Comprehensive tests in separate module
#[cfg(test)]
#[path = "outline_service_test.rs"]
mod outline_service_test;
