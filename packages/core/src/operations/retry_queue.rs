//! Structural move queue with retry logic for optimistic concurrency control
//!
//! This module provides a wrapper around `OutlineService` that handles stale
//! plans during indent and outdent by re-running the whole operation from
//! fresh reads with exponential backoff.
//!
//! Structural moves are the operations most prone to conflicts when several
//! writers touch the same sibling group. Each retry re-reads the node and
//! both groups, so the next plan is computed against current state.
//!
//! # Example
//!
//! ```rust
//! use outline_core::config::RetryConfig;
//! use outline_core::db::MemoryRepository;
//! use outline_core::operations::ConflictRetryQueue;
//! use outline_core::services::OutlineService;
//! use std::sync::Arc;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let service = Arc::new(OutlineService::new(Arc::new(MemoryRepository::new())));
//! service.create_node(None, "First".to_string(), None).await?;
//! let second = service.create_node(None, "Second".to_string(), None).await?;
//!
//! // Retry up to 3 times with exponential backoff (10ms, 20ms, 40ms)
//! let queue = ConflictRetryQueue::new(service, RetryConfig::default());
//! let changes = queue.indent_with_retry(&second.id).await?;
//! assert_eq!(changes.node(&second.id).map(|n| n.position), Some(0));
//! # Ok(())
//! # }
//! ```

use crate::config::RetryConfig;
use crate::models::ChangeSet;
use crate::services::{OutlineError, OutlineService};
use std::fmt;
use std::sync::Arc;
use tokio::time::Duration;

/// The structural operations the queue knows how to re-run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StructuralMove {
    Indent,
    Outdent,
}

impl fmt::Display for StructuralMove {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StructuralMove::Indent => f.write_str("indent"),
            StructuralMove::Outdent => f.write_str("outdent"),
        }
    }
}

/// Queue for structural moves with automatic retry on `StorageConflict`
pub struct ConflictRetryQueue {
    service: Arc<OutlineService>,
    retry: RetryConfig,
}

impl ConflictRetryQueue {
    pub fn new(service: Arc<OutlineService>, retry: RetryConfig) -> Self {
        Self { service, retry }
    }

    /// Build a queue using the retry policy from the service's configuration
    pub fn from_service(service: Arc<OutlineService>) -> Self {
        let retry = service.config().retry.clone();
        Self::new(service, retry)
    }

    pub async fn indent_with_retry(&self, node_id: &str) -> Result<ChangeSet, OutlineError> {
        self.run_with_retry(StructuralMove::Indent, node_id).await
    }

    pub async fn outdent_with_retry(&self, node_id: &str) -> Result<ChangeSet, OutlineError> {
        self.run_with_retry(StructuralMove::Outdent, node_id).await
    }

    /// Run a structural move, retrying stale plans
    ///
    /// # Retry Behavior
    ///
    /// - **Retry on**: `OutlineError::StorageConflict` only
    /// - **Backoff**: Exponential from `base_backoff_ms` (10ms, 20ms, 40ms, ...)
    /// - **Fresh data**: Each attempt re-reads the node and its groups
    /// - **Other errors**: Fail immediately without retry
    ///
    /// # Returns
    ///
    /// - `Ok(ChangeSet)` - Operation succeeded (possibly after retries)
    /// - `Err(OutlineError::StorageConflict)` - Max retries exceeded
    /// - `Err(OutlineError::*)` - Non-retryable error occurred
    pub async fn run_with_retry(
        &self,
        operation: StructuralMove,
        node_id: &str,
    ) -> Result<ChangeSet, OutlineError> {
        let mut attempt: u32 = 0;

        loop {
            let result = match operation {
                StructuralMove::Indent => self.service.indent(node_id).await,
                StructuralMove::Outdent => self.service.outdent(node_id).await,
            };

            match result {
                Ok(changes) => {
                    if attempt > 0 {
                        tracing::debug!(
                            "{} succeeded after {} retry(ies) for node '{}'",
                            operation,
                            attempt,
                            node_id
                        );
                    }
                    return Ok(changes);
                }

                Err(e) if e.is_retryable() && attempt < self.retry.max_retries => {
                    tracing::debug!(
                        "Conflict on attempt {}/{} of {} for node '{}': {}. Retrying...",
                        attempt + 1,
                        self.retry.max_retries + 1,
                        operation,
                        node_id,
                        e
                    );

                    tokio::time::sleep(self.backoff(attempt)).await;
                    attempt += 1;
                }

                Err(e) => {
                    if e.is_retryable() {
                        tracing::warn!(
                            "Max retries ({}) exceeded for node '{}' {} operation",
                            self.retry.max_retries,
                            node_id,
                            operation
                        );
                    }
                    return Err(e);
                }
            }
        }
    }

    fn backoff(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.retry.base_backoff_ms.saturating_mul(1u64 << attempt.min(16)))
    }
}
