//! Shared dispatch worker pool.

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Process-wide bound on concurrent pushes.
///
/// Shared across every strategy invocation; permit acquisition is the
/// back-pressure point that keeps one large fan-out from starving
/// others.
#[derive(Clone)]
pub struct DispatchPool {
    permits: Arc<Semaphore>,
}

impl DispatchPool {
    /// Create a pool with a fixed number of permits.
    pub fn new(permits: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(permits.max(1))),
        }
    }

    /// Acquire a permit, waiting when the pool is saturated.
    pub async fn acquire(&self) -> OwnedSemaphorePermit {
        self.permits
            .clone()
            .acquire_owned()
            .await
            .expect("dispatch pool semaphore closed")
    }

    /// Permits currently available.
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }
}
