//! Domain Events for the outline engine
//!
//! This module defines the events `OutlineService` broadcasts after a batch
//! commits. They let view layers and other observers react to changes without
//! coupling to the repository implementation.
//!
//! # Architecture
//!
//! Events are emitted using tokio's broadcast channel, allowing multiple
//! subscribers to receive notifications asynchronously.
//!
//! # Event Flow
//!
//! 1. `OutlineService` commits one atomic batch
//! 2. A domain event carrying the committed rows is emitted
//! 3. All subscribers receive the event asynchronously
//! 4. `TreeProjection::apply_event` invalidates the affected groups

use crate::models::{ChangeSet, Node};
use serde::{Deserialize, Serialize};

/// Domain events emitted after a committed mutation
///
/// Events describe domain-level changes, never partial writes. They are only
/// emitted once their batch has committed, one per row change a subscriber
/// cares about: a structural move is a single `StructureChanged`, while a
/// creation that also expands its parent yields `NodeCreated` then
/// `NodeUpdated`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum OutlineEvent {
    /// A new node was created
    #[serde(rename = "nodeCreated")]
    NodeCreated(Node),

    /// Content or expansion of a node changed (no ordering effect)
    #[serde(rename = "nodeUpdated")]
    NodeUpdated(Node),

    /// An indent or outdent rewrote linkage and positions
    #[serde(rename = "structureChanged")]
    StructureChanged(ChangeSet),
}

impl OutlineEvent {
    /// Get a string representation of the event type
    pub fn event_type(&self) -> &str {
        match self {
            OutlineEvent::NodeCreated(_) => "node:created",
            OutlineEvent::NodeUpdated(_) => "node:updated",
            OutlineEvent::StructureChanged(_) => "structure:changed",
        }
    }
}
