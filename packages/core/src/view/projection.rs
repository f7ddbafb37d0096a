//! Lazily loaded tree view over `OutlineService`
//!
//! `TreeProjection` caches what a renderer has seen: every loaded node, its
//! visible expansion state and, once fetched, the ordered ids of its
//! children. Children are fetched on first expansion only and reused until a
//! committed `ChangeSet` invalidates their group.
//!
//! # Cache Invalidation
//!
//! Invalidation is driven by `ChangeSet::affected_groups`:
//! - **Visible groups** (the root group, or the children of a shown and
//!   expanded row) are refetched immediately
//! - **Hidden groups** are dropped and refetched on next expansion

use crate::db::OutlineEvent;
use crate::models::{ChangeSet, Language, Node};
use crate::services::{OutlineError, OutlineService};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Expander shown next to a row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RowMarker {
    Expanded,
    /// Collapsed, or children not fetched yet
    Collapsed,
    Leaf,
}

/// One line of the flattened render list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisibleRow {
    pub id: String,
    pub depth: usize,
    pub text: String,
    pub marker: RowMarker,
}

#[derive(Debug, Clone)]
struct ProjectedNode {
    node: Node,
    expanded: bool,
    /// `None` until the child group has been fetched
    children: Option<Vec<String>>,
}

impl ProjectedNode {
    fn new(node: Node) -> Self {
        Self {
            expanded: node.is_expanded,
            node,
            children: None,
        }
    }

    fn shows_children(&self) -> bool {
        self.expanded && self.children.is_some()
    }
}

pub struct TreeProjection {
    service: Arc<OutlineService>,
    entries: HashMap<String, ProjectedNode>,
    roots: Option<Vec<String>>,
    fetches: usize,
}

impl TreeProjection {
    /// Create an empty projection; call `load_roots` before rendering
    pub fn new(service: Arc<OutlineService>) -> Self {
        Self {
            service,
            entries: HashMap::new(),
            roots: None,
            fetches: 0,
        }
    }

    /// Number of group fetches issued against the service
    pub fn fetch_count(&self) -> usize {
        self.fetches
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.entries.get(id).map(|e| &e.node)
    }

    /// Whether `id` currently shows its children
    pub fn is_expanded(&self, id: &str) -> bool {
        self.entries.get(id).is_some_and(ProjectedNode::shows_children)
    }

    /// Cached child ids of `id`, if fetched
    pub fn cached_children(&self, id: &str) -> Option<&[String]> {
        self.entries.get(id).and_then(|e| e.children.as_deref())
    }

    /// Fetch the root group (no-op once loaded)
    pub async fn load_roots(&mut self) -> Result<(), OutlineError> {
        if self.roots.is_none() {
            self.fetch_group(None).await?;
        }
        Ok(())
    }

    /// Flip the visible expansion of `id` and persist it
    ///
    /// The first expansion fetches the children; later toggles reuse the
    /// cached list until it is invalidated. Returns the new visible state.
    pub async fn toggle_expand(&mut self, id: &str) -> Result<bool, OutlineError> {
        let expand = match self.entries.get(id) {
            Some(entry) => !entry.shows_children(),
            None => return Err(OutlineError::node_not_found(id)),
        };

        let persisted = self.service.set_expanded(id, expand).await?;
        let needs_fetch = match self.entries.get_mut(id) {
            Some(entry) => {
                entry.node = persisted;
                entry.expanded = expand;
                expand && entry.children.is_none()
            }
            None => false,
        };

        if needs_fetch {
            self.fetch_group(Some(id)).await?;
        }

        tracing::debug!(
            "Toggled '{}' to {}",
            id,
            if expand { "expanded" } else { "collapsed" }
        );
        Ok(expand)
    }

    /// Merge a committed structural change
    pub async fn apply_changes(&mut self, changes: &ChangeSet) -> Result<(), OutlineError> {
        for node in &changes.nodes {
            self.merge_node(node.clone());
        }

        if changes.touches_group(None) && self.roots.is_some() {
            self.fetch_group(None).await?;
        }

        let visible = self.visible_ids();
        for group in changes.affected_groups.iter().flatten() {
            let shown = visible.contains(group)
                && self.entries.get(group).is_some_and(|e| e.expanded);
            if shown {
                self.fetch_group(Some(group.as_str())).await?;
            } else if let Some(entry) = self.entries.get_mut(group) {
                entry.children = None;
            }
        }

        Ok(())
    }

    /// Show a node just created through the "add child" affordance
    ///
    /// The parent becomes visibly expanded. The node is appended to a loaded
    /// child list; an unloaded list is fetched instead.
    pub async fn insert_created(&mut self, node: &Node) -> Result<(), OutlineError> {
        self.merge_created(node, true).await
    }

    /// Merge a domain event broadcast by the engine
    pub async fn apply_event(&mut self, event: &OutlineEvent) -> Result<(), OutlineError> {
        match event {
            OutlineEvent::NodeCreated(node) => self.merge_created(node, false).await,
            OutlineEvent::NodeUpdated(node) => {
                self.merge_node(node.clone());
                Ok(())
            }
            OutlineEvent::StructureChanged(changes) => self.apply_changes(changes).await,
        }
    }

    /// Flattened, depth-annotated rows in display order
    pub fn visible_rows(&self, language: Language) -> Vec<VisibleRow> {
        let mut rows = Vec::new();
        if let Some(roots) = &self.roots {
            for id in roots {
                self.push_rows(id, 0, language, &mut rows);
            }
        }
        rows
    }

    fn push_rows(&self, id: &str, depth: usize, language: Language, rows: &mut Vec<VisibleRow>) {
        let Some(entry) = self.entries.get(id) else {
            return;
        };

        let marker = match &entry.children {
            Some(children) if children.is_empty() => RowMarker::Leaf,
            Some(_) if entry.expanded => RowMarker::Expanded,
            _ => RowMarker::Collapsed,
        };
        rows.push(VisibleRow {
            id: id.to_string(),
            depth,
            text: entry.node.display_content(language).to_string(),
            marker,
        });

        if marker == RowMarker::Expanded {
            if let Some(children) = &entry.children {
                for child in children {
                    self.push_rows(child, depth + 1, language, rows);
                }
            }
        }
    }

    async fn merge_created(&mut self, node: &Node, expand_parent: bool) -> Result<(), OutlineError> {
        let mut entry = ProjectedNode::new(node.clone());
        entry.children = Some(Vec::new());
        self.entries.entry(node.id.clone()).or_insert(entry);

        let Some(parent_id) = node.parent_id.as_deref() else {
            if let Some(roots) = self.roots.as_mut() {
                if !roots.contains(&node.id) {
                    roots.push(node.id.clone());
                }
            }
            return Ok(());
        };

        let needs_fetch = match self.entries.get_mut(parent_id) {
            Some(parent) => {
                if expand_parent {
                    parent.expanded = true;
                }
                match parent.children.as_mut() {
                    Some(children) => {
                        if !children.contains(&node.id) {
                            children.push(node.id.clone());
                        }
                        false
                    }
                    None => expand_parent,
                }
            }
            None => false,
        };

        if needs_fetch {
            self.fetch_group(Some(parent_id)).await?;
        }
        Ok(())
    }

    /// Replace the cached row; visible expansion follows the persisted flag
    fn merge_node(&mut self, node: Node) {
        if let Some(entry) = self.entries.get_mut(&node.id) {
            entry.expanded = node.is_expanded;
            entry.node = node;
        }
    }

    async fn fetch_group(&mut self, parent_id: Option<&str>) -> Result<(), OutlineError> {
        let group = match parent_id {
            Some(pid) => self.service.get_children(pid).await?,
            None => self.service.get_roots().await?,
        };
        self.fetches += 1;

        let ids: Vec<String> = group.iter().map(|n| n.id.clone()).collect();
        for node in group {
            match self.entries.get_mut(&node.id) {
                Some(entry) => {
                    entry.expanded = node.is_expanded;
                    entry.node = node;
                }
                None => {
                    self.entries.insert(node.id.clone(), ProjectedNode::new(node));
                }
            }
        }

        match parent_id {
            Some(pid) => {
                if let Some(entry) = self.entries.get_mut(pid) {
                    entry.children = Some(ids);
                }
            }
            None => self.roots = Some(ids),
        }
        Ok(())
    }

    /// Ids of every row the renderer currently shows
    fn visible_ids(&self) -> HashSet<String> {
        let mut visible = HashSet::new();
        let mut stack: Vec<&String> = self.roots.iter().flatten().collect();

        while let Some(id) = stack.pop() {
            if !visible.insert(id.clone()) {
                continue;
            }
            if let Some(entry) = self.entries.get(id) {
                if entry.shows_children() {
                    stack.extend(entry.children.iter().flatten());
                }
            }
        }
        visible
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryRepository;

    fn node(id: &str, parent: Option<&str>, position: u32) -> Node {
        Node::new_with_id(
            id.to_string(),
            id.to_uppercase(),
            None,
            parent.map(str::to_string),
            position,
        )
    }

    fn collapsed(id: &str, parent: Option<&str>, position: u32) -> Node {
        let mut n = node(id, parent, position);
        n.is_expanded = false;
        n
    }

    async fn projection_over(
        nodes: Vec<Node>,
    ) -> (TreeProjection, Arc<OutlineService>, Arc<MemoryRepository>) {
        let repo = Arc::new(MemoryRepository::with_nodes(nodes));
        let service = Arc::new(OutlineService::new(repo.clone()));
        let mut projection = TreeProjection::new(service.clone());
        projection.load_roots().await.unwrap();
        (projection, service, repo)
    }

    fn row_ids(projection: &TreeProjection) -> Vec<(String, usize)> {
        projection
            .visible_rows(Language::English)
            .into_iter()
            .map(|r| (r.id, r.depth))
            .collect()
    }

    #[tokio::test]
    async fn test_lazy_load_fetches_once() {
        let (mut projection, _service, repo) = projection_over(vec![
            collapsed("a", None, 0),
            node("a1", Some("a"), 0),
        ])
        .await;
        assert_eq!(projection.fetch_count(), 1);
        let calls_after_roots = repo.children_calls();

        assert!(projection.toggle_expand("a").await.unwrap());
        assert_eq!(projection.fetch_count(), 2);

        assert!(!projection.toggle_expand("a").await.unwrap());
        assert!(projection.toggle_expand("a").await.unwrap());
        assert_eq!(projection.fetch_count(), 2);
        assert_eq!(projection.cached_children("a").unwrap(), ["a1".to_string()]);
        // one children() call for the single expansion fetch
        assert_eq!(repo.children_calls(), calls_after_roots + 1);
    }

    #[tokio::test]
    async fn test_toggle_persists_expansion() {
        let (mut projection, service, _repo) =
            projection_over(vec![collapsed("a", None, 0), node("a1", Some("a"), 0)]).await;

        projection.toggle_expand("a").await.unwrap();
        assert!(service.get_node("a").await.unwrap().unwrap().is_expanded);

        projection.toggle_expand("a").await.unwrap();
        assert!(!service.get_node("a").await.unwrap().unwrap().is_expanded);
    }

    #[tokio::test]
    async fn test_unloaded_rows_show_collapsed_marker() {
        let (mut projection, _service, _repo) =
            projection_over(vec![node("a", None, 0), node("a1", Some("a"), 0), node("b", None, 1)])
                .await;

        let rows = projection.visible_rows(Language::English);
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.marker == RowMarker::Collapsed));

        // persisted flag is already true, so the toggle only loads children
        projection.toggle_expand("b").await.unwrap();
        let rows = projection.visible_rows(Language::English);
        assert_eq!(rows[1].marker, RowMarker::Leaf);
    }

    #[tokio::test]
    async fn test_apply_changes_refetches_visible_groups() {
        let (mut projection, service, _repo) =
            projection_over(vec![node("a", None, 0), node("b", None, 1), node("c", None, 2)])
                .await;
        projection.toggle_expand("a").await.unwrap();

        let changes = service.indent("b").await.unwrap();
        projection.apply_changes(&changes).await.unwrap();

        assert_eq!(
            row_ids(&projection),
            vec![
                ("a".to_string(), 0),
                ("b".to_string(), 1),
                ("c".to_string(), 0)
            ]
        );
    }

    #[tokio::test]
    async fn test_apply_changes_drops_hidden_groups() {
        let (mut projection, service, _repo) = projection_over(vec![
            node("a", None, 0),
            node("a1", Some("a"), 0),
            node("a2", Some("a"), 1),
        ])
        .await;
        projection.toggle_expand("a").await.unwrap();
        projection.toggle_expand("a1").await.unwrap();
        projection.toggle_expand("a").await.unwrap();
        assert!(projection.cached_children("a1").is_some());
        let fetches = projection.fetch_count();

        // a's group is hidden (a collapsed), a1's group is hidden too
        let changes = service.indent("a2").await.unwrap();
        projection.apply_changes(&changes).await.unwrap();

        assert_eq!(projection.fetch_count(), fetches);
        assert!(projection.cached_children("a").is_none());
        assert!(projection.cached_children("a1").is_none());
    }

    #[tokio::test]
    async fn test_insert_created_expands_parent() {
        let (mut projection, service, _repo) =
            projection_over(vec![collapsed("p", None, 0)]).await;

        let child = service.create_child("p").await.unwrap();
        projection.insert_created(&child).await.unwrap();

        assert!(projection.is_expanded("p"));
        let rows = projection.visible_rows(Language::Chinese);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].text, "新节点");
        assert_eq!(rows[1].marker, RowMarker::Leaf);
        // engine left the persisted flag alone
        assert!(!service.get_node("p").await.unwrap().unwrap().is_expanded);
    }

    #[tokio::test]
    async fn test_apply_event_follows_engine() {
        let (mut projection, service, _repo) =
            projection_over(vec![node("a", None, 0), node("b", None, 1)]).await;
        let mut rx = service.subscribe();

        service
            .update_content("a", Language::Chinese, "甲".into())
            .await
            .unwrap();
        service.create_node(None, "C".into(), None).await.unwrap();

        for _ in 0..2 {
            let event = rx.recv().await.unwrap();
            projection.apply_event(&event).await.unwrap();
        }

        let rows = projection.visible_rows(Language::Chinese);
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].text, "甲");
        assert_eq!(rows[1].text, "B");
        assert_eq!(rows[2].text, "C");
    }
}
