//! Background timers
//!
//! Three periodic loops drive the engine's time-based behavior:
//! - sweep: fail stalled setups, then evict expired terminal sessions
//! - heartbeat: probe subscribers and drop the unresponsive ones
//! - metrics: publish a `system_metrics` snapshot
//!
//! Each loop only calls the orchestrator's public operations.

use super::orchestrator::SessionOrchestrator;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

/// Running timer tasks. Dropping the handle leaves them running; call
/// [`SchedulerHandle::shutdown`] to stop them.
pub struct SchedulerHandle {
    shutdown_tx: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl SchedulerHandle {
    /// Signal every loop to stop and wait for them
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        for task in self.tasks {
            let _ = task.await;
        }
        info!("Scheduler stopped");
    }
}

pub struct Scheduler;

impl Scheduler {
    /// Spawn the timer loops on the current tokio runtime
    pub fn spawn(orchestrator: Arc<SessionOrchestrator>) -> SchedulerHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let config = orchestrator.config().clone();

        let sweep = {
            let orchestrator = orchestrator.clone();
            spawn_loop("sweep", config.sweep_interval(), shutdown_rx.clone(), move || {
                let now = Utc::now();
                let expired = orchestrator.expire_stalled_sessions(now);
                let report = orchestrator.sweep_terminal(now);
                if !expired.is_empty() || !report.evicted.is_empty() {
                    debug!(
                        expired = expired.len(),
                        evicted = report.evicted.len(),
                        "Sweep tick"
                    );
                }
            })
        };

        let heartbeat = {
            let broadcaster = orchestrator.broadcaster().clone();
            spawn_loop("heartbeat", config.heartbeat_interval(), shutdown_rx.clone(), move || {
                broadcaster.heartbeat();
            })
        };

        let metrics = {
            let orchestrator = orchestrator.clone();
            spawn_loop("metrics", config.metrics_interval(), shutdown_rx, move || {
                orchestrator.publish_system_metrics();
            })
        };

        info!(
            sweep_secs = config.sweep_interval_seconds,
            heartbeat_secs = config.heartbeat_interval_seconds,
            metrics_secs = config.metrics_interval_seconds,
            "Scheduler started"
        );

        SchedulerHandle {
            shutdown_tx,
            tasks: vec![sweep, heartbeat, metrics],
        }
    }
}

fn spawn_loop(
    name: &'static str,
    period: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
    mut tick: impl FnMut() + Send + 'static,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(period);
        // A slow tick is never followed by a burst of catch-up ticks
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick completes immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => tick(),
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        debug!(task = name, "Timer loop stopping");
                        break;
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::domain::session::{SessionState, SessionTrigger};
    use crate::domain::shared::{SessionId, Topic};
    use crate::infrastructure::broadcast::{ChannelSink, EventBroadcaster, OutboundMessage};

    fn orchestrator(config: EngineConfig) -> Arc<SessionOrchestrator> {
        Arc::new(SessionOrchestrator::new(config, Arc::new(EventBroadcaster::new())))
    }

    #[tokio::test(start_paused = true)]
    async fn test_ringing_timeout_fails_session() {
        let orchestrator = orchestrator(EngineConfig {
            ringing_timeout_seconds: 1,
            ..Default::default()
        });
        let id = SessionId::new("s1");
        orchestrator.create_session(id.clone(), "+15551234567").unwrap();
        orchestrator.transition(&id, SessionTrigger::Ringing).unwrap();

        let handle = Scheduler::spawn(orchestrator.clone());

        // Wall-clock time drives the timeout, paused tokio time drives the ticks
        std::thread::sleep(Duration::from_millis(1100));
        tokio::time::sleep(Duration::from_secs(2)).await;

        assert_eq!(orchestrator.get(&id).unwrap().state(), SessionState::Failed);
        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_metrics_snapshot_published() {
        let orchestrator = orchestrator(EngineConfig {
            metrics_interval_seconds: 1,
            ..Default::default()
        });
        let (sink, mut rx) = ChannelSink::channel(16);
        let subscriber = orchestrator.broadcaster().connect(Arc::new(sink));
        orchestrator
            .broadcaster()
            .subscribe(subscriber, Topic::metrics())
            .unwrap();

        let handle = Scheduler::spawn(orchestrator.clone());
        tokio::time::sleep(Duration::from_millis(1500)).await;

        match rx.try_recv() {
            Ok(OutboundMessage::Event(event)) => assert_eq!(event.event_type(), "system_metrics"),
            other => panic!("expected a metrics snapshot, got {:?}", other),
        }
        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_drops_silent_subscriber() {
        let orchestrator = orchestrator(EngineConfig {
            heartbeat_interval_seconds: 1,
            ..Default::default()
        });
        let (sink, _rx) = ChannelSink::channel(16);
        let subscriber = orchestrator.broadcaster().connect(Arc::new(sink));

        let handle = Scheduler::spawn(orchestrator.clone());
        // First probe goes out, second finds no pong
        tokio::time::sleep(Duration::from_millis(2500)).await;

        assert!(!orchestrator.broadcaster().is_connected(subscriber));
        handle.shutdown().await;
    }
}
