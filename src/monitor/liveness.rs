//! # Liveness Checker
//!
//! Periodic sweep over the [`MonitorStore`]: every alive server silent for
//! longer than the timeout flips to dead, and the registered Index Server
//! gets one `SERVER_DOWN` per transition.
//!
//! The store lock is held only while computing and applying transitions;
//! notifications are sent afterwards. A failed delivery is logged and
//! dropped: no retry, and the server stays dead.

use anyhow::Result;
use log::{debug, info, warn};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::store::{MonitorStore, NotificationTarget};
use crate::common::connection::LineConnection;
use crate::common::protocol::{current_timestamp, ServerDown};
use crate::common::shutdown::Shutdown;

pub struct LivenessChecker {
    store: Arc<MonitorStore>,
    interval: Duration,
    timeout: Duration,
    notify_timeout: Duration,
}

impl LivenessChecker {
    pub fn new(
        store: Arc<MonitorStore>,
        interval: Duration,
        timeout: Duration,
        notify_timeout: Duration,
    ) -> Self {
        Self {
            store,
            interval,
            timeout,
            notify_timeout,
        }
    }

    /// Sweep every `interval` until shutdown.
    pub async fn run(&self, shutdown: Shutdown) {
        info!(
            "⏱️  Liveness checker every {:?}, timeout {:?}",
            self.interval, self.timeout
        );
        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {},
                _ = shutdown.wait() => break,
            }
            self.sweep().await;
        }
    }

    pub async fn sweep(&self) -> Vec<String> {
        self.sweep_at(Instant::now()).await
    }

    /// One pass as of `now`. Returns the servers that died in this pass;
    /// each got exactly one delivery attempt.
    pub async fn sweep_at(&self, now: Instant) -> Vec<String> {
        let expired = self.store.expire_stale(now, self.timeout).await;
        if expired.is_empty() {
            return Vec::new();
        }

        let target = self.store.notification_target().await;
        let mut dead = Vec::with_capacity(expired.len());
        for (server_id, silent) in expired {
            warn!(
                "💀 Server {} marked as DEAD (no heartbeat for {:.1}s)",
                server_id,
                silent.as_secs_f64()
            );
            match &target {
                Some(target) => {
                    match notify_failure(target, &server_id, self.notify_timeout).await {
                        Ok(()) => info!(
                            "📤 Notified Index Server at {} about {} failure",
                            target.address(),
                            server_id
                        ),
                        Err(e) => warn!("⚠️  Failed to notify Index Server: {:#}", e),
                    }
                }
                None => debug!("No Index Server registered, {} failure not pushed", server_id),
            }
            dead.push(server_id);
        }
        dead
    }
}

/// Deliver one `SERVER_DOWN <id> <unix_timestamp>` and close.
pub async fn notify_failure(
    target: &NotificationTarget,
    server_id: &str,
    limit: Duration,
) -> Result<()> {
    let mut conn = LineConnection::connect(&target.address(), limit).await?;
    let notice = ServerDown {
        server_id: server_id.to_string(),
        timestamp: current_timestamp(),
    };
    tokio::time::timeout(limit, conn.write_line(&notice.to_string())).await??;
    Ok(())
}
