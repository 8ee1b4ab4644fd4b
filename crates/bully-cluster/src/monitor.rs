//! Heartbeat-driven leader failure detector

use crate::election::ElectionEngine;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Recurring timer that probes the believed leader
///
/// Each tick delegates to [`ElectionEngine::check_leader_health`]: a
/// down node or a self-believed leader does nothing, a missing or
/// unresponsive leader triggers re-election.
pub struct HeartbeatMonitor {
    engine: Arc<ElectionEngine>,
    interval: Duration,
}

impl HeartbeatMonitor {
    pub fn new(engine: Arc<ElectionEngine>, interval: Duration) -> Self {
        Self { engine, interval }
    }

    /// Spawn the monitor loop as a background task
    pub fn spawn(self) -> MonitorHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let engine = self.engine;
        let period = self.interval;

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            tracing::info!(
                "Heartbeat monitor started for node {} (period {:?})",
                engine.self_id(),
                period
            );

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        engine.check_leader_health().await;
                    }
                    _ = shutdown_rx.changed() => {
                        tracing::info!("Heartbeat monitor for node {} stopping", engine.self_id());
                        break;
                    }
                }
            }
        });

        MonitorHandle {
            shutdown: shutdown_tx,
            task,
        }
    }
}

/// Handle for stopping a running heartbeat monitor
pub struct MonitorHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl MonitorHandle {
    /// Signal the loop to stop and wait for it to exit
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        let _ = self.task.await;
    }

    /// Stop the loop without waiting
    pub fn abort(self) {
        self.task.abort();
    }
}
