//! Storage Layer
//!
//! This module holds everything the engine knows about persistence:
//!
//! - `NodeRepository` - the async storage contract (get, ordered children,
//!   atomic batch)
//! - `MemoryRepository` - transactional in-memory implementation
//! - `CompensatingRepository` - lifts a row-at-a-time `RowStore` to the
//!   atomic contract with snapshot-and-restore compensation
//! - `OutlineEvent` - domain events broadcast after commits
//!
//! # Architecture
//!
//! The repository has no ordering policy. Positions and parent links are
//! computed by `OutlineService` and submitted as a single `WriteBatch` per
//! operation; the store only guarantees atomicity, re-validates the sibling
//! groups the plan was built from, and rejects writes that would dangle or
//! cycle.

mod compensating;
mod error;
pub mod events;
mod memory_store;
mod repository;

pub use compensating::{CompensatingRepository, RowStore};
pub use error::StoreError;
pub use events::OutlineEvent;
pub use memory_store::MemoryRepository;
pub use repository::{GroupExpectation, NodeRepository, NodeWrite, WriteBatch};
