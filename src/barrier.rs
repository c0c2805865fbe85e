// src/barrier.rs
//! Wait for a task queue to drain

use std::time::Duration;
use tokio::time::error::Elapsed;

use crate::queue::TaskQueue;

/// Resolve once `queue` has nothing pending and nothing in flight.
///
/// Everything enqueued before this call is covered: `enqueue` clears the idle
/// flag synchronously, and `wait_for` inspects the current value before it
/// parks, so an already idle queue returns straight away.
pub async fn wait_until_drained(queue: &TaskQueue) {
    let mut idle = queue.subscribe_idle();
    // The sender lives as long as `queue`, so this cannot observe a close.
    let _ = idle.wait_for(|is_idle| *is_idle).await;
}

/// Like [`wait_until_drained`], but gives up after `limit`.
pub async fn wait_until_drained_for(queue: &TaskQueue, limit: Duration) -> Result<(), Elapsed> {
    tokio::time::timeout(limit, wait_until_drained(queue)).await
}
