//! Service Layer Error Types
//!
//! This module defines the error taxonomy callers of `OutlineService` react
//! to. Each variant maps to one recovery strategy:
//!
//! - `NodeNotFound` / `ParentNotFound` - stale view, refetch
//! - `InvalidOperation` - structural precondition failed, surface as a no-op
//! - `StorageConflict` - concurrent change to a sibling group, retry the whole
//!   operation from fresh reads
//! - `StorageUnavailable` - transport failure, retry with backoff
//! - `IntegrityViolation` - the store refused a batch that would corrupt the
//!   forest (indicates a bug, never retried)

use crate::db::StoreError;
use std::fmt;
use thiserror::Error;

/// Why a structural operation was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidOperationReason {
    /// Indent of the first root: no sibling above and no parent to fall back to
    FirstRoot,

    /// Indent of a node that is first among its siblings
    NoSiblingAbove,

    /// Outdent of a node that is already a root
    AlreadyRoot,
}

impl fmt::Display for InvalidOperationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            InvalidOperationReason::FirstRoot => "cannot indent the first root node",
            InvalidOperationReason::NoSiblingAbove => "no sibling above to become the new parent",
            InvalidOperationReason::AlreadyRoot => "cannot outdent a root node",
        };
        f.write_str(text)
    }
}

/// Outline operation errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OutlineError {
    /// Node not found by ID
    #[error("Node not found: {id}")]
    NodeNotFound { id: String },

    /// Referenced parent does not exist
    #[error("Parent node not found: {parent_id}")]
    ParentNotFound { parent_id: String },

    /// Structural precondition violated
    #[error("Invalid operation on node '{node_id}': {reason}")]
    InvalidOperation {
        node_id: String,
        reason: InvalidOperationReason,
    },

    /// Optimistic check detected a concurrent change
    #[error("Storage conflict: {context}")]
    StorageConflict { context: String },

    /// Transport-level failure
    #[error("Storage unavailable: {context}")]
    StorageUnavailable { context: String },

    /// Store refused a batch that would break referential integrity
    #[error("Integrity violation: {0}")]
    IntegrityViolation(String),
}

impl OutlineError {
    /// Create a node not found error
    pub fn node_not_found(id: impl Into<String>) -> Self {
        Self::NodeNotFound { id: id.into() }
    }

    /// Create a parent not found error
    pub fn parent_not_found(parent_id: impl Into<String>) -> Self {
        Self::ParentNotFound {
            parent_id: parent_id.into(),
        }
    }

    /// Create an invalid operation error
    pub fn invalid_operation(node_id: impl Into<String>, reason: InvalidOperationReason) -> Self {
        Self::InvalidOperation {
            node_id: node_id.into(),
            reason,
        }
    }

    /// Create a storage conflict error
    pub fn storage_conflict(context: impl Into<String>) -> Self {
        Self::StorageConflict {
            context: context.into(),
        }
    }

    /// Create a storage unavailable error
    pub fn storage_unavailable(context: impl Into<String>) -> Self {
        Self::StorageUnavailable {
            context: context.into(),
        }
    }

    /// Only stale-plan conflicts are worth retrying from fresh reads
    pub fn is_retryable(&self) -> bool {
        matches!(self, OutlineError::StorageConflict { .. })
    }
}

impl From<StoreError> for OutlineError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { id } => OutlineError::NodeNotFound { id },
            StoreError::Conflict { context } => OutlineError::StorageConflict { context },
            StoreError::Unavailable { context } => OutlineError::StorageUnavailable { context },
            StoreError::Rejected { reason } => OutlineError::IntegrityViolation(reason),
        }
    }
}
