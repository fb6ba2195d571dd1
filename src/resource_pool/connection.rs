//! Backing connections that supply pooled tabs

use anyhow::Result;
use std::future::Future;

use crate::config::PoolConfig;

/// A browser session that owns one or more tabs.
///
/// The pool creates connections through [`Connection::launch`] or
/// [`Connection::connect`], pads them with tabs, initializes every tab and
/// only then hands the tabs out. Closing a connection invalidates its tabs.
pub trait Connection: Send + Sync + Sized + 'static {
    /// Handle to a single tab. Cloning must not duplicate the tab itself.
    type Resource: Clone + Send + Sync + 'static;

    /// Start a fresh local browser
    fn launch(config: &PoolConfig) -> impl Future<Output = Result<Self>> + Send;

    /// Attach to a remote browser at `address`
    fn connect(address: &str) -> impl Future<Output = Result<Self>> + Send;

    /// Where this connection points, for diagnostics
    fn endpoint(&self) -> String;

    /// Tabs the session already has open
    fn resources(&self) -> impl Future<Output = Result<Vec<Self::Resource>>> + Send;

    /// Open one more tab
    fn open_resource(&self) -> impl Future<Output = Result<Self::Resource>> + Send;

    /// One-shot setup run on each tab before it enters the pool.
    ///
    /// A failure here keeps the whole connection out of the pool.
    fn initialize_resource(
        &self,
        resource: &Self::Resource,
        config: &PoolConfig,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Tear the session down
    fn close(self) -> impl Future<Output = Result<()>> + Send;
}
