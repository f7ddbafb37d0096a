//! Stale Plan Detection Tests
//!
//! A competing writer commits between the engine's reads and its batch. The
//! store must reject the stale batch with `StorageConflict`, leave the
//! competitor's write intact, and `ConflictRetryQueue` must recover by
//! re-planning from fresh reads. A competitor that moves siblings between
//! the engine's node read and its group read must not leave a gap behind.

#[cfg(test)]
mod conflict_retry_tests {
    use anyhow::Result;
    use async_trait::async_trait;
    use outline_core::config::RetryConfig;
    use outline_core::db::{MemoryRepository, NodeRepository, StoreError, WriteBatch};
    use outline_core::models::{check_invariants, Node};
    use outline_core::operations::ConflictRetryQueue;
    use outline_core::services::{OutlineError, OutlineService};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Repository that lets a competing writer append a root right before
    /// each of the next `races` batches
    struct RacingRepository {
        inner: MemoryRepository,
        races: AtomicUsize,
    }

    impl RacingRepository {
        fn new(nodes: Vec<Node>, races: usize) -> Self {
            Self {
                inner: MemoryRepository::with_nodes(nodes),
                races: AtomicUsize::new(races),
            }
        }

        async fn compete(&self) -> Result<(), StoreError> {
            let roots = self.inner.children(None).await?;
            let position = roots.len() as u32;
            let intruder = Node::new_with_id(
                format!("x{}", position),
                "intruder".to_string(),
                None,
                None,
                position,
            );
            self.inner
                .apply_batch(WriteBatch::new().expect_group(None, &roots).insert(intruder))
                .await?;
            Ok(())
        }
    }

    #[async_trait]
    impl NodeRepository for RacingRepository {
        async fn get(&self, id: &str) -> Result<Option<Node>, StoreError> {
            self.inner.get(id).await
        }

        async fn children(&self, parent_id: Option<&str>) -> Result<Vec<Node>, StoreError> {
            self.inner.children(parent_id).await
        }

        async fn apply_batch(&self, batch: WriteBatch) -> Result<Vec<Node>, StoreError> {
            let pending = self
                .races
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
            if pending.is_ok() {
                self.compete().await?;
            }
            self.inner.apply_batch(batch).await
        }

        async fn count(&self) -> Result<usize, StoreError> {
            self.inner.count().await
        }
    }

    /// Repository that, on the first root-group read, lets a competing
    /// service indent `movers` before answering
    ///
    /// The engine has already read the node it is moving, so its copy of that
    /// node's position is stale by the time the group arrives.
    struct ShiftingRepository {
        inner: Arc<MemoryRepository>,
        movers: Vec<&'static str>,
        armed: AtomicBool,
    }

    impl ShiftingRepository {
        fn new(nodes: Vec<Node>, movers: Vec<&'static str>) -> Self {
            Self {
                inner: Arc::new(MemoryRepository::with_nodes(nodes)),
                movers,
                armed: AtomicBool::new(true),
            }
        }
    }

    #[async_trait]
    impl NodeRepository for ShiftingRepository {
        async fn get(&self, id: &str) -> Result<Option<Node>, StoreError> {
            self.inner.get(id).await
        }

        async fn children(&self, parent_id: Option<&str>) -> Result<Vec<Node>, StoreError> {
            if parent_id.is_none() && self.armed.swap(false, Ordering::SeqCst) {
                let competitor = OutlineService::new(self.inner.clone());
                for id in &self.movers {
                    competitor
                        .indent(id)
                        .await
                        .map_err(|e| StoreError::unavailable(e.to_string()))?;
                }
            }
            self.inner.children(parent_id).await
        }

        async fn apply_batch(&self, batch: WriteBatch) -> Result<Vec<Node>, StoreError> {
            self.inner.apply_batch(batch).await
        }

        async fn count(&self) -> Result<usize, StoreError> {
            self.inner.count().await
        }
    }

    fn root(id: &str, position: u32) -> Node {
        Node::new_with_id(id.to_string(), id.to_string(), None, None, position)
    }

    fn setup(races: usize) -> (Arc<RacingRepository>, Arc<OutlineService>) {
        let repo = Arc::new(RacingRepository::new(
            vec![root("a", 0), root("b", 1), root("c", 2)],
            races,
        ));
        let service = Arc::new(OutlineService::new(repo.clone()));
        (repo, service)
    }

    fn fast_retry(max_retries: u32) -> RetryConfig {
        RetryConfig {
            max_retries,
            base_backoff_ms: 1,
        }
    }

    #[tokio::test]
    async fn test_stale_plan_is_rejected() -> Result<()> {
        let (repo, service) = setup(1);

        let result = service.indent("c").await;

        assert!(matches!(result, Err(OutlineError::StorageConflict { .. })));
        let snapshot = repo.inner.snapshot().await;
        check_invariants(&snapshot)?;
        // only the competitor committed
        assert_eq!(repo.inner.committed_batches(), 1);
        let c = service.get_node("c").await?.expect("c exists");
        assert!(c.is_root());
        assert_eq!(c.position, 2);

        Ok(())
    }

    #[tokio::test]
    async fn test_retry_queue_recovers_from_conflict() -> Result<()> {
        let (repo, service) = setup(1);
        let queue = ConflictRetryQueue::new(service.clone(), fast_retry(3));

        let changes = queue.indent_with_retry("c").await?;

        assert_eq!(changes.node("c").unwrap().parent_id.as_deref(), Some("b"));
        let roots: Vec<String> = service.get_roots().await?.into_iter().map(|n| n.id).collect();
        assert_eq!(roots, vec!["a", "b", "x3"]);
        check_invariants(&repo.inner.snapshot().await)?;

        Ok(())
    }

    #[tokio::test]
    async fn test_retry_queue_gives_up_after_max_retries() -> Result<()> {
        let (repo, service) = setup(10);
        let queue = ConflictRetryQueue::new(service.clone(), fast_retry(2));

        let result = queue.indent_with_retry("c").await;

        assert!(matches!(result, Err(OutlineError::StorageConflict { .. })));
        // three attempts, each preceded by a competing commit
        assert_eq!(repo.inner.committed_batches(), 3);
        check_invariants(&repo.inner.snapshot().await)?;

        Ok(())
    }

    #[tokio::test]
    async fn test_outdent_retry_uses_fresh_positions() -> Result<()> {
        let repo = Arc::new(RacingRepository::new(
            vec![root("a", 0), Node::new_with_id("a1".into(), "a1".into(), None, Some("a".into()), 0)],
            1,
        ));
        let service = Arc::new(OutlineService::new(repo.clone()));
        let queue = ConflictRetryQueue::from_service(service.clone());

        queue.outdent_with_retry("a1").await?;

        let roots: Vec<(String, u32)> = service
            .get_roots()
            .await?
            .into_iter()
            .map(|n| (n.id, n.position))
            .collect();
        assert_eq!(
            roots,
            vec![
                ("a".to_string(), 0),
                ("a1".to_string(), 1),
                ("x1".to_string(), 2)
            ]
        );
        check_invariants(&repo.inner.snapshot().await)?;

        Ok(())
    }

    fn positions(group: Vec<Node>) -> Vec<(String, u32)> {
        group.into_iter().map(|n| (n.id, n.position)).collect()
    }

    #[tokio::test]
    async fn test_indent_plans_from_group_read_not_earlier_get() -> Result<()> {
        let ids = ["a", "b", "c", "d", "e", "f"];
        let forest = ids
            .iter()
            .enumerate()
            .map(|(i, id)| root(id, i as u32))
            .collect();
        // d is read at position 3, then b and c move under a
        let repo = Arc::new(ShiftingRepository::new(forest, vec!["b", "c"]));
        let service = OutlineService::new(repo.clone());

        let changes = service.indent("d").await?;

        assert_eq!(changes.node("d").unwrap().parent_id.as_deref(), Some("a"));
        assert_eq!(
            positions(service.get_roots().await?),
            vec![
                ("a".to_string(), 0),
                ("e".to_string(), 1),
                ("f".to_string(), 2)
            ]
        );
        assert_eq!(
            positions(service.get_children("a").await?),
            vec![
                ("b".to_string(), 0),
                ("c".to_string(), 1),
                ("d".to_string(), 2)
            ]
        );
        check_invariants(&repo.inner.snapshot().await)?;

        Ok(())
    }

    #[tokio::test]
    async fn test_outdent_uses_parent_position_from_group_read() -> Result<()> {
        // c is read at position 2, then b moves under a
        let repo = Arc::new(ShiftingRepository::new(
            vec![
                root("a", 0),
                root("b", 1),
                root("c", 2),
                Node::new_with_id("c1".into(), "c1".into(), None, Some("c".into()), 0),
            ],
            vec!["b"],
        ));
        let service = OutlineService::new(repo.clone());

        service.outdent("c1").await?;

        assert_eq!(
            positions(service.get_roots().await?),
            vec![
                ("a".to_string(), 0),
                ("c".to_string(), 1),
                ("c1".to_string(), 2)
            ]
        );
        check_invariants(&repo.inner.snapshot().await)?;

        Ok(())
    }
}
