//! Ordering helpers and caller-side operation wrappers
//!
//! - `SiblingOrder` - pure renumbering deltas for sibling groups
//! - `ConflictRetryQueue` - re-runs indent/outdent on stale-plan conflicts

pub mod ordering;
pub mod retry_queue;

// Re-export types for convenience
pub use ordering::{PositionUpdate, SiblingOrder};
pub use retry_queue::{ConflictRetryQueue, StructuralMove};
