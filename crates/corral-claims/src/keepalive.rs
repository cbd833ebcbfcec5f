//! Claim TTL keep-alive loop.
//!
//! One loop runs per peer process for as long as the peer lives: every
//! `ttl/2` it extends the expiry of the peer's claim keys, and on stop
//! it deletes them so the claims of a cleanly stopped peer don't linger
//! until their TTL. Refresh failures are logged, never propagated — the
//! loop runs detached and the next tick retries.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::registry::ClaimRegistry;

/// Start the keep-alive loop for a registry.
pub fn spawn_keep_alive(registry: Arc<dyn ClaimRegistry>, ttl: Duration) -> KeepAliveHandle {
    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

    let task = tokio::spawn(async move {
        info!(ttl = ?ttl, "claim keep-alive started");

        let mut interval = tokio::time::interval(ttl / 2);
        // The interval fires immediately; nothing to refresh yet.
        interval.tick().await;

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = registry.refresh_active(ttl).await {
                        warn!(error = %e, "claim keep-alive refresh failed");
                    }
                }
                _ = shutdown_rx.changed() => break,
            }
        }

        // Best-effort cleanup before the task ends.
        if let Err(e) = registry.shutdown_cleanup().await {
            warn!(error = %e, "claim cleanup on shutdown failed");
        }
        info!("claim keep-alive stopped");
    });

    KeepAliveHandle { shutdown_tx, task }
}

/// Handle to a running keep-alive loop.
///
/// [`KeepAliveHandle::stop`] consumes the handle, so the loop cannot be
/// stopped twice.
pub struct KeepAliveHandle {
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl KeepAliveHandle {
    /// Stop the loop and wait for the final cleanup batch to finish.
    pub async fn stop(self) {
        let _ = self.shutdown_tx.send(true);
        let _ = self.task.await;
    }
}
