//! Compensating batch adapter for non-transactional row stores
//!
//! Some backends (plain REST row APIs, for example) can only write one row
//! per request. `CompensatingRepository` lifts such a `RowStore` to the
//! all-or-nothing `NodeRepository` contract:
//!
//! 1. Batches are serialized through an async mutex
//! 2. Group expectations are re-read and validated under that mutex
//! 3. Every touched row is snapshotted before the first write
//! 4. Rows are written in order; on the first failure, every row already
//!    written is restored from its snapshot (inserted rows are deleted)
//!
//! If the compensation itself fails, the error carries both causes so the
//! operator can repair the affected rows.

use crate::db::memory_store::stage_writes;
use crate::db::{NodeRepository, StoreError, WriteBatch};
use crate::models::forest::group_label;
use crate::models::Node;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use tokio::sync::Mutex;

/// Row-at-a-time storage without multi-row atomicity
#[async_trait]
pub trait RowStore: Send + Sync {
    async fn get_row(&self, id: &str) -> Result<Option<Node>, StoreError>;

    /// Rows whose `parent_id` equals `parent_id`, in any order
    async fn rows_with_parent(&self, parent_id: Option<&str>) -> Result<Vec<Node>, StoreError>;

    /// Insert or overwrite a full row
    async fn put_row(&self, node: Node) -> Result<(), StoreError>;

    async fn delete_row(&self, id: &str) -> Result<(), StoreError>;

    async fn count_rows(&self) -> Result<usize, StoreError>;
}

pub struct CompensatingRepository<S: RowStore> {
    rows: S,
    write_lock: Mutex<()>,
}

impl<S: RowStore> CompensatingRepository<S> {
    pub fn new(rows: S) -> Self {
        Self {
            rows,
            write_lock: Mutex::new(()),
        }
    }

    /// Access the wrapped row store
    pub fn rows(&self) -> &S {
        &self.rows
    }

    async fn ordered_group(&self, parent_id: Option<&str>) -> Result<Vec<Node>, StoreError> {
        let mut group = self.rows.rows_with_parent(parent_id).await?;
        group.sort_by(|a, b| a.position.cmp(&b.position).then_with(|| a.id.cmp(&b.id)));
        Ok(group)
    }

    /// Walk each staged row's ancestor chain through the overlay
    async fn validate_integrity(&self, staged: &HashMap<String, Node>) -> Result<(), StoreError> {
        let mut fetched: HashMap<String, Node> = HashMap::new();

        for row in staged.values() {
            let mut seen: HashSet<String> = HashSet::from([row.id.clone()]);
            let mut cursor = row.parent_id.clone();

            while let Some(parent_id) = cursor {
                let cached = staged
                    .get(&parent_id)
                    .or_else(|| fetched.get(&parent_id))
                    .cloned();
                let parent = match cached {
                    Some(parent) => parent,
                    None => {
                        let parent = self.rows.get_row(&parent_id).await?.ok_or_else(|| {
                            StoreError::rejected(format!(
                                "node '{}' references missing parent '{}'",
                                row.id, parent_id
                            ))
                        })?;
                        fetched.insert(parent_id.clone(), parent.clone());
                        parent
                    }
                };
                if !seen.insert(parent.id.clone()) {
                    return Err(StoreError::rejected(format!(
                        "moving node '{}' would create a cycle",
                        row.id
                    )));
                }
                cursor = parent.parent_id;
            }
        }
        Ok(())
    }

    /// Undo already-applied rows in reverse order
    async fn compensate(&self, applied: Vec<(String, Option<Node>)>) -> Result<(), StoreError> {
        for (id, previous) in applied.into_iter().rev() {
            match previous {
                Some(row) => self.rows.put_row(row).await?,
                None => self.rows.delete_row(&id).await?,
            }
        }
        Ok(())
    }
}

#[async_trait]
impl<S: RowStore> NodeRepository for CompensatingRepository<S> {
    async fn get(&self, id: &str) -> Result<Option<Node>, StoreError> {
        self.rows.get_row(id).await
    }

    async fn children(&self, parent_id: Option<&str>) -> Result<Vec<Node>, StoreError> {
        self.ordered_group(parent_id).await
    }

    async fn apply_batch(&self, batch: WriteBatch) -> Result<Vec<Node>, StoreError> {
        let _guard = self.write_lock.lock().await;

        for expectation in &batch.expectations {
            let current = self.ordered_group(expectation.parent_id.as_deref()).await?;
            if !expectation.matches(&current) {
                return Err(StoreError::conflict(format!(
                    "sibling group {} changed since it was read",
                    group_label(expectation.parent_id.as_deref())
                )));
            }
        }

        let mut base: HashMap<String, Node> = HashMap::new();
        for write in &batch.writes {
            if base.contains_key(write.id()) {
                continue;
            }
            if let Some(row) = self.rows.get_row(write.id()).await? {
                base.insert(row.id.clone(), row);
            }
        }

        let (mut staged, order) = stage_writes(&base, &batch.writes)?;
        self.validate_integrity(&staged).await?;

        let mut applied: Vec<(String, Option<Node>)> = Vec::with_capacity(order.len());
        let mut committed = Vec::with_capacity(order.len());

        for id in order {
            let Some(row) = staged.remove(&id) else {
                continue;
            };
            match self.rows.put_row(row.clone()).await {
                Ok(()) => {
                    applied.push((id.clone(), base.get(&id).cloned()));
                    committed.push(row);
                }
                Err(write_error) => {
                    tracing::warn!(
                        "Row write for '{}' failed, compensating {} applied row(s): {}",
                        id,
                        applied.len(),
                        write_error
                    );
                    return match self.compensate(applied).await {
                        Ok(()) => Err(write_error),
                        Err(undo_error) => Err(StoreError::unavailable(format!(
                            "write failed ({}) and compensation failed ({})",
                            write_error, undo_error
                        ))),
                    };
                }
            }
        }

        Ok(committed)
    }

    async fn count(&self) -> Result<usize, StoreError> {
        self.rows.count_rows().await
    }
}
