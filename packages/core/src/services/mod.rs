//! Business Services
//!
//! This module contains the tree mutation engine:
//!
//! - `OutlineService` - creation, edits, indent/outdent and reads
//! - `OutlineError` - the error taxonomy callers react to
//!
//! Services coordinate between the storage layer and application logic,
//! validating preconditions and committing one atomic batch per operation.

pub mod error;
pub mod outline_service;

pub use error::{InvalidOperationReason, OutlineError};
pub use outline_service::OutlineService;
