//! Shutdown coordination.

use std::collections::HashSet;
use std::sync::atomic::Ordering;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::types::{Event, ShutdownSummary, TaskId};

use super::Engine;

impl Engine {
    /// Shut the engine down, draining active runners for at most `timeout`
    ///
    /// Sequence:
    /// 1. Stop accepting new tasks and starts
    /// 2. Request stop on every active runner
    /// 3. Wait up to `timeout` for them to finish
    /// 4. Emit `Shutdown`
    ///
    /// Runners still active when the timeout expires are reported in
    /// [`ShutdownSummary::left`]; they keep running detached until their
    /// current request returns.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ShuttingDown`] if shutdown was already called.
    pub async fn shutdown(&self, timeout: Duration) -> Result<ShutdownSummary> {
        if !self.pool.accepting_new.swap(false, Ordering::SeqCst) {
            return Err(Error::ShuttingDown);
        }
        tracing::info!(timeout_ms = timeout.as_millis() as u64, "Initiating shutdown");

        let requested = self.stop_all_active().await;

        match tokio::time::timeout(timeout, self.wait_for_active_runners()).await {
            Ok(()) => tracing::info!("All active tasks finished"),
            Err(_) => tracing::warn!("Timeout waiting for active tasks, proceeding with shutdown"),
        }

        let still_active: HashSet<TaskId> = self
            .pool
            .active_runners
            .lock()
            .await
            .keys()
            .copied()
            .collect();
        let (left, joined): (Vec<TaskId>, Vec<TaskId>) = requested
            .iter()
            .copied()
            .partition(|id| still_active.contains(id));

        let summary = ShutdownSummary {
            requested,
            joined,
            left,
        };

        self.emit_event(Event::Shutdown);
        tracing::info!(
            requested = summary.requested_count(),
            joined = summary.joined_count(),
            left = summary.left_count(),
            "Shutdown complete"
        );
        Ok(summary)
    }

    /// Signal stop to every active runner; returns their ids, ordered
    async fn stop_all_active(&self) -> Vec<TaskId> {
        let active = self.pool.active_runners.lock().await;
        let mut ids: Vec<TaskId> = active.keys().copied().collect();
        for control in active.values() {
            control.cancel.cancel();
        }
        ids.sort();
        tracing::debug!(active_count = ids.len(), "Signalled stop to all active tasks");
        ids
    }

    async fn wait_for_active_runners(&self) {
        let poll = self.config.shutdown_poll_interval;
        loop {
            let active_count = self.pool.active_runners.lock().await.len();
            if active_count == 0 {
                return;
            }
            tracing::debug!(active_count, "Waiting for active tasks to finish");
            tokio::time::sleep(poll).await;
        }
    }
}
