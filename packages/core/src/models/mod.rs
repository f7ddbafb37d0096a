//! Data Models
//!
//! This module contains the core data structures of the outline:
//!
//! - `Node` - A vertex of the forest with bilingual content
//! - `NodePatch` - Sparse field update applied by repository writes
//! - `Language` - Explicit selector for the content field being read or written
//! - `ChangeSet` - Committed rows and affected sibling groups of a structural move
//! - `forest` - Snapshot-level invariant checking

mod change_set;
pub mod forest;
mod node;

pub use change_set::ChangeSet;
pub use forest::{check_invariants, InvariantViolation};
pub use node::{Language, Node, NodePatch};
