//! A view of the pool pinned to one priority

use std::future::Future;
use std::sync::Arc;

use super::connection::Connection;
use super::error::PoolError;
use super::priority::Priority;
use super::ResourcePool;

/// Hands out tabs at a fixed priority.
///
/// Scrapers take one of these instead of the pool itself, so the level is
/// decided where the work originates (an interactive lookup versus the
/// background refresh job) rather than deep in the crawl code.
#[derive(Debug)]
pub struct PrioritizedPool<C: Connection> {
    pool: Arc<ResourcePool<C>>,
    priority: Priority,
}

impl<C: Connection> Clone for PrioritizedPool<C> {
    fn clone(&self) -> Self {
        Self {
            pool: Arc::clone(&self.pool),
            priority: self.priority,
        }
    }
}

impl<C: Connection> PrioritizedPool<C> {
    #[must_use]
    pub fn new(pool: Arc<ResourcePool<C>>, priority: Priority) -> Self {
        Self { pool, priority }
    }

    #[must_use]
    pub fn priority(&self) -> Priority {
        self.priority
    }

    #[must_use]
    pub fn pool(&self) -> &Arc<ResourcePool<C>> {
        &self.pool
    }

    /// [`ResourcePool::with_resource`] at this view's priority
    pub async fn with_resource<T, F, Fut>(&self, task_key: &str, task: F) -> Result<T, PoolError>
    where
        F: FnMut(C::Resource) -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        self.pool.with_resource(self.priority, task_key, task).await
    }

    /// Number of tabs in the underlying pool
    pub fn resource_count(&self) -> Result<usize, PoolError> {
        self.pool.live_resource_count()
    }
}

impl<C: Connection> ResourcePool<C> {
    /// Bind a handle to `priority`
    #[must_use]
    pub fn at_priority(self: &Arc<Self>, priority: Priority) -> PrioritizedPool<C> {
        PrioritizedPool::new(Arc::clone(self), priority)
    }
}
