//! RAII guard for a checked-out tab

use std::sync::Arc;
use std::time::Instant;

use super::connection::Connection;
use super::stats::ResourceId;
use super::ResourcePool;

/// A tab together with the id the pool tracks it by
pub(crate) struct Slot<R> {
    pub(crate) id: ResourceId,
    pub(crate) resource: R,
}

/// What a queued request receives: a tab, or word that the pool is gone
pub(crate) enum Assignment<C: Connection> {
    Assigned(Lease<C>),
    PoolClosed,
}

/// Exclusive use of one pooled tab.
///
/// Dropping the lease returns the tab to the pool, which hands it straight to
/// the highest-priority waiter if there is one. A lease dropped before
/// [`Lease::mark_completed`] is recorded as an abandoned task.
pub struct Lease<C: Connection> {
    pool: Arc<ResourcePool<C>>,
    id: ResourceId,
    resource: C::Resource,
    checked_out_at: Instant,
    completed: bool,
    armed: bool,
}

impl<C: Connection> Lease<C> {
    pub(crate) fn new(pool: Arc<ResourcePool<C>>, slot: Slot<C::Resource>) -> Self {
        Self {
            pool,
            id: slot.id,
            resource: slot.resource,
            checked_out_at: Instant::now(),
            completed: false,
            armed: true,
        }
    }

    #[must_use]
    pub fn id(&self) -> ResourceId {
        self.id
    }

    #[must_use]
    pub fn resource(&self) -> &C::Resource {
        &self.resource
    }

    /// Count the task as finished when the lease is released
    pub fn mark_completed(&mut self) {
        self.completed = true;
    }

    /// Take the tab back without going through check-in.
    ///
    /// Used by the scheduler while it already holds its own lock, so that
    /// dropping the lease does not try to lock again.
    pub(crate) fn disarm(mut self) -> Slot<C::Resource> {
        self.armed = false;
        Slot {
            id: self.id,
            resource: self.resource.clone(),
        }
    }
}

impl<C: Connection> std::fmt::Debug for Lease<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lease")
            .field("id", &self.id)
            .field("completed", &self.completed)
            .finish_non_exhaustive()
    }
}

impl<C: Connection> Drop for Lease<C> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        self.armed = false;
        let slot = Slot {
            id: self.id,
            resource: self.resource.clone(),
        };
        self.pool
            .check_in(slot, self.checked_out_at.elapsed(), self.completed);
    }
}
