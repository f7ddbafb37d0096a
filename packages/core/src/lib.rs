//! Outline Core - Tree Engine for a Bilingual Outline Editor
//!
//! This crate keeps a forest of text nodes consistently ordered and parented
//! under mutation: creation, content edits, expand/collapse, indent and
//! outdent.
//!
//! # Architecture
//!
//! - **Dense sibling ranks**: every sibling group is numbered exactly `0..n-1`
//! - **One batch per operation**: each mutation commits a single atomic
//!   `WriteBatch` or nothing at all
//! - **Optimistic checks**: batches carry snapshots of the sibling groups they
//!   were planned from and are rejected if those groups moved underneath
//! - **Explicit language**: bilingual content is addressed by a `Language`
//!   parameter, never by global state
//!
//! # Modules
//!
//! - [`models`] - Data structures (Node, NodePatch, ChangeSet) and invariant checks
//! - [`db`] - Storage contract, in-memory and compensating repositories, events
//! - [`operations`] - Pure ordering helpers and the conflict retry queue
//! - [`services`] - The tree mutation engine (`OutlineService`)
//! - [`view`] - Lazily loaded tree projection for renderers
//! - [`config`] - Engine configuration
//! - [`logging`] - Tracing subscriber setup

pub mod config;
pub mod db;
pub mod logging;
pub mod models;
pub mod operations;
pub mod services;
pub mod view;

// Re-export commonly used types
pub use config::{ConfigError, EngineConfig, RetryConfig};
pub use db::{MemoryRepository, NodeRepository, OutlineEvent, StoreError, WriteBatch};
pub use models::*;
pub use operations::{ConflictRetryQueue, SiblingOrder};
pub use services::*;
pub use view::{RowMarker, TreeProjection, VisibleRow};
