//! A remote connect attempt that cleans up after itself

use anyhow::{Result, anyhow};
use tokio::task::JoinHandle;
use tracing::info;

use super::close_quietly;
use super::connection::Connection;

/// Connect task running on its own tokio task.
///
/// If the attempt is dropped before [`finish`](Self::finish) returns (the
/// connect timed out, or the caller's future was cancelled), whatever
/// connection eventually arrives is closed instead of leaking.
pub(crate) struct PendingConnect<C: Connection> {
    address: String,
    attempt: Option<JoinHandle<Result<C>>>,
}

impl<C: Connection> PendingConnect<C> {
    pub(crate) fn start(address: &str) -> Self {
        let target = address.to_string();
        Self {
            address: address.to_string(),
            attempt: Some(tokio::spawn(async move { C::connect(&target).await })),
        }
    }

    /// Wait for the connect task. Cancel-safe: dropping this future leaves the
    /// attempt armed for cleanup.
    pub(crate) async fn finish(&mut self) -> Result<C> {
        let Some(attempt) = self.attempt.as_mut() else {
            return Err(anyhow!("connect attempt to {} already finished", self.address));
        };
        let joined = attempt.await;
        self.attempt = None;
        joined.map_err(|join_error| anyhow!(join_error).context("connect task failed"))?
    }
}

impl<C: Connection> Drop for PendingConnect<C> {
    fn drop(&mut self) {
        let Some(attempt) = self.attempt.take() else {
            return;
        };
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            attempt.abort();
            return;
        };
        let address = std::mem::take(&mut self.address);
        runtime.spawn(async move {
            if let Ok(Ok(late)) = attempt.await {
                info!("Closing abandoned connection to {}", address);
                close_quietly(late).await;
            }
        });
    }
}
