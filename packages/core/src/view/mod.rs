//! Tree View Projection
//!
//! The lazily loaded, expandable view a renderer consumes. It reads through
//! `OutlineService`, caches child groups on first expansion, and invalidates
//! exactly the sibling groups a committed `ChangeSet` names.

mod projection;

pub use projection::{RowMarker, TreeProjection, VisibleRow};
