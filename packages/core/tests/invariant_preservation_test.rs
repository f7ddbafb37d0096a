//! Invariant Preservation Tests
//!
//! Enumerates every sequence of create/indent/outdent/set-expanded operations
//! up to a fixed depth from a small starting forest and checks, after each
//! step, that sibling positions stay dense, parents resolve, and the parent
//! relation stays acyclic. Refused operations must leave the store untouched.

#[cfg(test)]
mod invariant_preservation_tests {
    use anyhow::Result;
    use outline_core::db::MemoryRepository;
    use outline_core::models::{check_invariants, Node};
    use outline_core::services::{OutlineError, OutlineService};
    use std::sync::Arc;

    const MAX_DEPTH: usize = 3;

    #[derive(Debug, Clone)]
    enum Op {
        CreateRoot,
        CreateChild(String),
        Indent(String),
        Outdent(String),
        Toggle(String),
    }

    fn ops_for(snapshot: &[Node]) -> Vec<Op> {
        let mut ids: Vec<&String> = snapshot.iter().map(|n| &n.id).collect();
        ids.sort();

        let mut ops = vec![Op::CreateRoot];
        for id in ids {
            ops.push(Op::CreateChild(id.clone()));
            ops.push(Op::Indent(id.clone()));
            ops.push(Op::Outdent(id.clone()));
            ops.push(Op::Toggle(id.clone()));
        }
        ops
    }

    async fn apply(service: &OutlineService, snapshot: &[Node], op: &Op) -> Result<(), OutlineError> {
        match op {
            Op::CreateRoot => service.create_node(None, "root".into(), None).await.map(|_| ()),
            Op::CreateChild(id) => service.create_child(id).await.map(|_| ()),
            Op::Indent(id) => service.indent(id).await.map(|_| ()),
            Op::Outdent(id) => service.outdent(id).await.map(|_| ()),
            Op::Toggle(id) => {
                let expanded = snapshot
                    .iter()
                    .find(|n| &n.id == id)
                    .map(|n| n.is_expanded)
                    .unwrap_or(true);
                service.set_expanded(id, !expanded).await.map(|_| ())
            }
        }
    }

    fn sorted(mut nodes: Vec<Node>) -> Vec<Node> {
        nodes.sort_by(|a, b| a.id.cmp(&b.id));
        nodes
    }

    fn start_forest() -> Vec<Node> {
        vec![
            Node::new_with_id("a".into(), "A".into(), None, None, 0),
            Node::new_with_id("b".into(), "B".into(), None, None, 1),
            Node::new_with_id("b1".into(), "B1".into(), None, Some("b".into()), 0),
        ]
    }

    #[tokio::test]
    async fn test_every_operation_sequence_preserves_invariants() -> Result<()> {
        let mut frontier: Vec<(Vec<Node>, Vec<Op>)> = vec![(start_forest(), Vec::new())];
        let mut explored = 0usize;

        while let Some((snapshot, history)) = frontier.pop() {
            for op in ops_for(&snapshot) {
                let repo = Arc::new(MemoryRepository::with_nodes(snapshot.clone()));
                let service = OutlineService::new(repo.clone());

                let result = apply(&service, &snapshot, &op).await;
                let after = repo.snapshot().await;
                explored += 1;

                if let Err(violation) = check_invariants(&after) {
                    panic!("{:?} then {:?} broke invariants: {}", history, op, violation);
                }

                match result {
                    Ok(()) => {
                        assert_eq!(repo.committed_batches(), 1, "{:?} then {:?}", history, op);
                        if history.len() + 1 < MAX_DEPTH {
                            let mut next = history.clone();
                            next.push(op);
                            frontier.push((after, next));
                        }
                    }
                    Err(OutlineError::InvalidOperation { .. }) => {
                        assert_eq!(repo.committed_batches(), 0);
                        assert_eq!(sorted(after), sorted(snapshot.clone()));
                    }
                    Err(e) => panic!("{:?} then {:?} failed unexpectedly: {}", history, op, e),
                }
            }
        }

        assert!(explored > 1000, "explored only {} transitions", explored);
        Ok(())
    }

    #[tokio::test]
    async fn test_indent_outdent_round_trip_restores_membership() -> Result<()> {
        // every non-first child of every group, indented then outdented
        let mut forest = start_forest();
        forest.push(Node::new_with_id("b2".into(), "B2".into(), None, Some("b".into()), 1));
        forest.push(Node::new_with_id("b3".into(), "B3".into(), None, Some("b".into()), 2));
        forest.push(Node::new_with_id("c".into(), "C".into(), None, None, 2));

        for id in ["b", "c", "b2", "b3"] {
            let repo = Arc::new(MemoryRepository::with_nodes(forest.clone()));
            let service = OutlineService::new(repo.clone());
            let node = service.get_node(id).await?.expect("fixture node");

            let group_before = match node.parent_id.as_deref() {
                Some(pid) => service.get_children(pid).await?,
                None => service.get_roots().await?,
            };

            service.indent(id).await?;
            service.outdent(id).await?;

            let group_after = match node.parent_id.as_deref() {
                Some(pid) => service.get_children(pid).await?,
                None => service.get_roots().await?,
            };
            let members = |group: &[Node]| -> Vec<(String, u32)> {
                group.iter().map(|n| (n.id.clone(), n.position)).collect()
            };
            assert_eq!(members(&group_after), members(&group_before), "round trip of {}", id);
            check_invariants(&repo.snapshot().await)?;
        }

        Ok(())
    }
}
