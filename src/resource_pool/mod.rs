//! Priority-scheduled pool of browser tabs
//!
//! A small, fixed set of tabs (spread over local and remote browsers) is shared
//! by many concurrent crawl tasks. Requests that find no free tab wait in one
//! queue per [`Priority`]; whenever a tab comes back, the highest non-empty
//! level is served first. Tasks run under a retry loop that backs off on
//! rate limiting and transient failures while the tab stays checked out.
//!
//! All bookkeeping lives behind one mutex whose critical sections never await.

pub mod connection;
pub mod error;
mod lease;
mod pending_connect;
pub mod prioritized;
pub mod priority;
pub mod stats;

pub use connection::Connection;
pub use error::PoolError;
pub use lease::Lease;
pub use prioritized::PrioritizedPool;
pub use priority::{ParsePriorityError, Priority};
pub use stats::{BackoffSnapshot, ErrorRecord, PoolStatus, ResourceDiagnostics, ResourceId};

use anyhow::Context;
use parking_lot::Mutex;
use std::collections::{BTreeMap, VecDeque};
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{oneshot, watch};
use tracing::{debug, info, warn};

use crate::config::{PoolConfig, WaiterOrder};
use crate::retry::{BackoffController, BackoffDecision, ErrorCategory, classify};
use lease::{Assignment, Slot};
use pending_connect::PendingConnect;
use stats::ResourceStats;

// =============================================================================
// Scheduler state
// =============================================================================

/// A request parked until a tab frees up
struct Waiter<C: Connection> {
    priority: Priority,
    task_key: String,
    tx: oneshot::Sender<Assignment<C>>,
}

struct PoolState<C: Connection> {
    queues: [VecDeque<Waiter<C>>; Priority::COUNT],
    free: Vec<Slot<C::Resource>>,
    stats: BTreeMap<ResourceId, ResourceStats>,
    connections: Vec<C>,
    shutting_down: bool,
}

impl<C: Connection> PoolState<C> {
    fn new() -> Self {
        Self {
            queues: std::array::from_fn(|_| VecDeque::new()),
            free: Vec::new(),
            stats: BTreeMap::new(),
            connections: Vec::new(),
            shutting_down: false,
        }
    }

    /// Pop the next waiter from the highest non-empty level
    fn next_waiter(&mut self, order: WaiterOrder) -> Option<Waiter<C>> {
        self.queues.iter_mut().find_map(|queue| match order {
            WaiterOrder::Lifo => queue.pop_back(),
            WaiterOrder::Fifo => queue.pop_front(),
        })
    }

    fn ensure_running(&self) -> Result<(), PoolError> {
        if self.shutting_down {
            Err(PoolError::PoolShutDown)
        } else {
            Ok(())
        }
    }

    fn queue_depths(&self) -> BTreeMap<Priority, usize> {
        Priority::LEVELS
            .into_iter()
            .zip(&self.queues)
            .map(|(level, queue)| (level, queue.iter().filter(|w| !w.tx.is_closed()).count()))
            .collect()
    }
}

// =============================================================================
// Resource Pool
// =============================================================================

/// Shared pool of tabs drawn from one or more backing connections
pub struct ResourcePool<C: Connection> {
    config: PoolConfig,
    backoff: BackoffController,
    state: Mutex<PoolState<C>>,
    next_id: AtomicU64,
    /// Flips to `true` once shutdown begins; wakes tasks sleeping in backoff
    closed: watch::Sender<bool>,
}

impl<C: Connection> std::fmt::Debug for ResourcePool<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourcePool")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<C: Connection> ResourcePool<C> {
    /// Create an empty pool; tabs arrive through
    /// [`launch_local_connection`](Self::launch_local_connection) and
    /// [`connect_backing_connection`](Self::connect_backing_connection)
    #[must_use]
    pub fn new(config: PoolConfig) -> Arc<Self> {
        let backoff = BackoffController::new(config.rate_limit_backoff(), config.temporary_backoff());
        let (closed, _) = watch::channel(false);
        Arc::new(Self {
            config,
            backoff,
            state: Mutex::new(PoolState::new()),
            next_id: AtomicU64::new(1),
            closed,
        })
    }

    #[must_use]
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    // -------------------------------------------------------------------------
    // Task submission
    // -------------------------------------------------------------------------

    /// Run `task` on a tab acquired at `priority`.
    ///
    /// Rate-limited and temporary failures are retried on the same tab with
    /// growing delays. Any other failure is returned as [`PoolError::Task`]
    /// once the tab is back in the pool. `task_key` names the work (usually
    /// the target URL) in diagnostics.
    pub async fn with_resource<T, F, Fut>(
        self: &Arc<Self>,
        priority: Priority,
        task_key: &str,
        mut task: F,
    ) -> Result<T, PoolError>
    where
        F: FnMut(C::Resource) -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        let mut lease = self.acquire(priority, task_key).await?;
        let result = self.run_with_retries(&lease, task_key, &mut task).await;
        lease.mark_completed();
        drop(lease);
        result
    }

    /// Wait for a tab at `priority` without running anything on it
    pub async fn acquire(self: &Arc<Self>, priority: Priority, task_key: &str) -> Result<Lease<C>, PoolError> {
        let Some(level) = priority.index() else {
            return Err(PoolError::InvalidPriority(priority));
        };

        let rx = {
            let mut state = self.state.lock();
            state.ensure_running()?;

            if let Some(slot) = state.free.pop() {
                if let Some(stats) = state.stats.get_mut(&slot.id) {
                    stats.mark_checked_out(priority, task_key);
                }
                debug!("Checked out {} at {} for {}", slot.id, priority, task_key);
                return Ok(Lease::new(Arc::clone(self), slot));
            }

            let (tx, rx) = oneshot::channel();
            let queue = &mut state.queues[level];
            queue.retain(|w| !w.tx.is_closed());
            queue.push_back(Waiter {
                priority,
                task_key: task_key.to_string(),
                tx,
            });
            debug!("No free tab, queued {} at {} (depth {})", task_key, priority, queue.len());
            rx
        };

        match rx.await {
            Ok(Assignment::Assigned(lease)) => Ok(lease),
            Ok(Assignment::PoolClosed) | Err(_) => Err(PoolError::PoolShutDown),
        }
    }

    async fn run_with_retries<T, F, Fut>(
        &self,
        lease: &Lease<C>,
        task_key: &str,
        task: &mut F,
    ) -> Result<T, PoolError>
    where
        F: FnMut(C::Resource) -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        let mut closed = self.closed.subscribe();
        loop {
            let error = match task(lease.resource().clone()).await {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };

            let category = classify(&error);
            match self.record_failure(lease.id(), &error, category, task_key) {
                BackoffDecision::RetryAfter(delay) => {
                    warn!(
                        "{} failure on {} for {}, retrying in {:?}: {:#}",
                        category,
                        lease.id(),
                        task_key,
                        delay,
                        error
                    );
                    tokio::select! {
                        () = tokio::time::sleep(delay) => {}
                        _ = closed.wait_for(|shut| *shut) => {
                            debug!("Pool shut down during backoff, not retrying {}", task_key);
                            return Err(PoolError::Task(error));
                        }
                    }
                }
                BackoffDecision::Exhausted { attempts } => {
                    warn!("Giving up on {} after {} {} failures", task_key, attempts, category);
                    return Err(PoolError::RetriesExhausted {
                        category,
                        attempts,
                        source: error,
                    });
                }
                BackoffDecision::GiveUp => return Err(PoolError::Task(error)),
            }
        }
    }

    /// Note the failure on the tab and advance its backoff.
    ///
    /// Once shutdown has begun nothing is retried.
    fn record_failure(
        &self,
        id: ResourceId,
        error: &anyhow::Error,
        category: ErrorCategory,
        task_key: &str,
    ) -> BackoffDecision {
        let mut state = self.state.lock();
        if state.shutting_down {
            return BackoffDecision::GiveUp;
        }
        let Some(stats) = state.stats.get_mut(&id) else {
            return BackoffDecision::GiveUp;
        };
        stats.last_error = Some(ErrorRecord::new(error, category, task_key));
        self.backoff.on_failure(&mut stats.backoff, category)
    }

    // -------------------------------------------------------------------------
    // Release
    // -------------------------------------------------------------------------

    /// Return a tab from a dropped [`Lease`]
    fn check_in(self: &Arc<Self>, slot: Slot<C::Resource>, duration: Duration, completed: bool) {
        let mut state = self.state.lock();
        if state.shutting_down {
            debug!("Dropping {} returned after shutdown", slot.id);
            return;
        }
        if let Some(stats) = state.stats.get_mut(&slot.id) {
            stats.mark_checked_in(duration, completed);
        }
        if !completed {
            debug!("{} released by an abandoned task", slot.id);
        }
        self.dispatch_locked(&mut state, slot);
    }

    /// Hand `slot` to the best waiter, or park it on the free list.
    ///
    /// Waiters whose callers have gone away are skipped.
    fn dispatch_locked(self: &Arc<Self>, state: &mut PoolState<C>, mut slot: Slot<C::Resource>) {
        while let Some(waiter) = state.next_waiter(self.config.waiter_order()) {
            if let Some(stats) = state.stats.get_mut(&slot.id) {
                stats.mark_checked_out(waiter.priority, &waiter.task_key);
            }
            let id = slot.id;
            let lease = Lease::new(Arc::clone(self), slot);
            match waiter.tx.send(Assignment::Assigned(lease)) {
                Ok(()) => {
                    debug!("Assigned {} to {} at {}", id, waiter.task_key, waiter.priority);
                    return;
                }
                Err(Assignment::Assigned(lease)) => {
                    debug!("Waiter for {} went away, trying the next one", waiter.task_key);
                    slot = lease.disarm();
                    if let Some(stats) = state.stats.get_mut(&slot.id) {
                        stats.mark_free();
                    }
                }
                Err(Assignment::PoolClosed) => return,
            }
        }
        state.free.push(slot);
    }

    // -------------------------------------------------------------------------
    // Connections
    // -------------------------------------------------------------------------

    /// Start a local browser and admit `resource_count` tabs from it
    pub async fn launch_local_connection(
        self: &Arc<Self>,
        resource_count: usize,
    ) -> Result<Vec<ResourceId>, PoolError> {
        let connection = C::launch(&self.config)
            .await
            .context("failed to launch local browser")
            .map_err(PoolError::Connection)?;
        self.admit(connection, resource_count).await
    }

    /// Attach to a remote browser and admit `resource_count` tabs from it.
    ///
    /// Fails with [`PoolError::ConnectTimeout`] when the browser does not
    /// answer within the configured budget. A connection that completes after
    /// the deadline, or after the caller stopped waiting, is closed in the
    /// background.
    pub async fn connect_backing_connection(
        self: &Arc<Self>,
        address: &str,
        resource_count: usize,
    ) -> Result<Vec<ResourceId>, PoolError> {
        let timeout = self.config.connect_timeout();
        let mut attempt = PendingConnect::<C>::start(address);

        let connection = match tokio::time::timeout(timeout, attempt.finish()).await {
            Ok(Ok(connection)) => connection,
            Ok(Err(e)) => {
                return Err(PoolError::Connection(
                    e.context(format!("failed to connect to {address}")),
                ));
            }
            Err(_) => {
                warn!("Connecting to {} timed out after {:?}", address, timeout);
                return Err(PoolError::ConnectTimeout {
                    address: address.to_string(),
                    timeout,
                });
            }
        };

        self.admit(connection, resource_count).await
    }

    /// Pad the connection to `resource_count` tabs, initialize them all and
    /// put them into service. The connection is closed on any failure.
    async fn admit(self: &Arc<Self>, connection: C, resource_count: usize) -> Result<Vec<ResourceId>, PoolError> {
        let resources = match self.prepare_resources(&connection, resource_count).await {
            Ok(resources) => resources,
            Err(e) => {
                close_quietly(connection).await;
                return Err(PoolError::Connection(e));
            }
        };

        let endpoint = connection.endpoint();
        let admitted = {
            let mut state = self.state.lock();
            if state.shutting_down {
                Err(connection)
            } else {
                let mut ids = Vec::with_capacity(resources.len());
                for resource in resources {
                    let id = ResourceId(self.next_id.fetch_add(1, Ordering::Relaxed));
                    state
                        .stats
                        .insert(id, ResourceStats::new(endpoint.clone(), self.backoff.fresh_states()));
                    self.dispatch_locked(&mut state, Slot { id, resource });
                    ids.push(id);
                }
                state.connections.push(connection);
                Ok(ids)
            }
        };

        match admitted {
            Ok(ids) => {
                info!("Admitted {} tabs from {}", ids.len(), endpoint);
                Ok(ids)
            }
            Err(connection) => {
                info!("Pool is shutting down, closing {} without admitting it", endpoint);
                close_quietly(connection).await;
                Err(PoolError::PoolShutDown)
            }
        }
    }

    async fn prepare_resources(&self, connection: &C, resource_count: usize) -> anyhow::Result<Vec<C::Resource>> {
        let mut resources = connection.resources().await.context("failed to list open tabs")?;
        while resources.len() < resource_count {
            resources.push(connection.open_resource().await.context("failed to open tab")?);
        }

        futures::future::try_join_all(
            resources
                .iter()
                .map(|resource| connection.initialize_resource(resource, &self.config)),
        )
        .await
        .context("failed to initialize tab")?;

        Ok(resources)
    }

    // -------------------------------------------------------------------------
    // Shutdown
    // -------------------------------------------------------------------------

    /// Stop accepting work, tell every waiter the pool is closed, then close
    /// every connection. Tasks already running keep their tabs until they
    /// finish; those tabs are dropped on return.
    pub async fn shutdown(&self) -> Result<(), PoolError> {
        let (waiters, connections) = {
            let mut state = self.state.lock();
            if state.shutting_down {
                return Err(PoolError::AlreadyShutDown);
            }
            state.shutting_down = true;
            self.closed.send_replace(true);

            let waiters: Vec<Waiter<C>> = state.queues.iter_mut().flat_map(|q| q.drain(..)).collect();
            let connections = std::mem::take(&mut state.connections);
            (waiters, connections)
        };

        info!(
            "Shutting down resource pool: {} waiters, {} connections",
            waiters.len(),
            connections.len()
        );

        for waiter in waiters {
            if waiter.tx.send(Assignment::PoolClosed).is_err() {
                debug!("Waiter for {} was already gone", waiter.task_key);
            }
        }

        for connection in connections {
            let endpoint = connection.endpoint();
            if let Err(e) = connection.close().await {
                warn!("Failed to close connection {}: {:#}", endpoint, e);
            }
        }

        {
            let mut state = self.state.lock();
            state.free.clear();
            state.stats.clear();
        }

        info!("Resource pool shutdown complete");
        Ok(())
    }

    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.state.lock().shutting_down
    }

    // -------------------------------------------------------------------------
    // Observability
    // -------------------------------------------------------------------------

    /// Tabs admitted to the pool, free or busy
    pub fn live_resource_count(&self) -> Result<usize, PoolError> {
        let state = self.state.lock();
        state.ensure_running()?;
        Ok(state.stats.len())
    }

    pub fn free_resource_count(&self) -> Result<usize, PoolError> {
        let state = self.state.lock();
        state.ensure_running()?;
        Ok(state.free.len())
    }

    /// Tabs currently assigned to a task
    pub fn in_use_count(&self) -> Result<usize, PoolError> {
        let state = self.state.lock();
        state.ensure_running()?;
        Ok(state.stats.values().filter(|s| !s.is_free()).count())
    }

    /// Pending requests per level
    pub fn queue_depths_by_priority(&self) -> Result<BTreeMap<Priority, usize>, PoolError> {
        let state = self.state.lock();
        state.ensure_running()?;
        Ok(state.queue_depths())
    }

    /// Per-tab statistics, ordered by [`ResourceId`]
    pub fn per_resource_diagnostics(&self) -> Result<Vec<ResourceDiagnostics>, PoolError> {
        let state = self.state.lock();
        state.ensure_running()?;
        Ok(state.stats.iter().map(|(id, stats)| stats.snapshot(*id)).collect())
    }

    /// Endpoints of the admitted connections
    pub fn connection_endpoints(&self) -> Result<Vec<String>, PoolError> {
        let state = self.state.lock();
        state.ensure_running()?;
        Ok(state.connections.iter().map(C::endpoint).collect())
    }

    /// Everything above, taken under a single lock
    pub fn status(&self) -> Result<PoolStatus, PoolError> {
        let state = self.state.lock();
        state.ensure_running()?;
        let in_use_resources = state.stats.values().filter(|s| !s.is_free()).count();
        Ok(PoolStatus {
            live_resources: state.stats.len(),
            free_resources: state.free.len(),
            in_use_resources,
            queue_depths: state.queue_depths(),
            connections: state.connections.iter().map(C::endpoint).collect(),
            resources: state.stats.iter().map(|(id, stats)| stats.snapshot(*id)).collect(),
        })
    }
}

async fn close_quietly<C: Connection>(connection: C) {
    let endpoint = connection.endpoint();
    if let Err(e) = connection.close().await {
        warn!("Failed to close connection {}: {:#}", endpoint, e);
    }
}
