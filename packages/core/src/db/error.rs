//! Store Error Types
//!
//! This module defines error types for repository operations. They separate
//! the cases a caller reacts to differently: a missing row, a stale plan
//! (retry from fresh reads), a transport failure (retry with backoff) and an
//! integrity rejection (a bug in the plan, never retried).

use thiserror::Error;

/// Repository operation errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// A write addressed a row that does not exist
    #[error("Row not found: {id}")]
    NotFound { id: String },

    /// Optimistic check failed: a sibling group changed since it was read
    #[error("Concurrent modification detected: {context}")]
    Conflict { context: String },

    /// Transport or backend failure
    #[error("Store unavailable: {context}")]
    Unavailable { context: String },

    /// The batch would break referential integrity or id uniqueness
    #[error("Batch rejected: {reason}")]
    Rejected { reason: String },
}

impl StoreError {
    /// Create a not found error
    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound { id: id.into() }
    }

    /// Create a conflict error
    pub fn conflict(context: impl Into<String>) -> Self {
        Self::Conflict {
            context: context.into(),
        }
    }

    /// Create an unavailable error
    pub fn unavailable(context: impl Into<String>) -> Self {
        Self::Unavailable {
            context: context.into(),
        }
    }

    /// Create a rejected error
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self::Rejected {
            reason: reason.into(),
        }
    }
}
