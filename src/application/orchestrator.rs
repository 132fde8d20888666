//! Session orchestrator
//!
//! Façade over the registry, the quality engine and the broadcaster. Every
//! mutation goes through here, including the ones made by background timers,
//! so there is one code path per state change.
//!
//! Events are handed to the broadcaster while the session's lock is held.
//! Delivery is a non-blocking queue push, so this keeps per-session event
//! order intact without making callers wait on subscribers.

use crate::config::EngineConfig;
use crate::domain::events::{EngineEvent, SystemMetricsPayload};
use crate::domain::quality::{BitrateChange, QualityEngine, QualityMetrics, StatsSample};
use crate::domain::session::{
    CallSession, EndOutcome, SessionHandle, SessionRegistry, SessionState, SessionTrigger,
};
use crate::domain::shared::{EngineError, Result, SessionId};
use crate::infrastructure::broadcast::EventBroadcaster;
use chrono::{DateTime, Utc};
use metrics::{counter, gauge, histogram};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Result of recording one statistics sample
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SampleOutcome {
    pub metrics: QualityMetrics,
    /// Present when the transport must switch to a new bitrate
    pub bitrate_change: Option<BitrateChange>,
}

/// Aggregate view of the registry
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineStatistics {
    pub total_sessions: usize,
    pub active_sessions: usize,
    pub connecting: usize,
    pub ringing: usize,
    pub active: usize,
    pub on_hold: usize,
    pub ended: usize,
    pub failed: usize,
    pub recording: usize,
    pub average_mos: Option<f64>,
    pub subscribers: usize,
}

/// Outcome of one eviction sweep
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub evicted: Vec<SessionId>,
    /// Expired but still being read; retried next sweep
    pub deferred: Vec<SessionId>,
    /// Another sweep was already running
    pub skipped: bool,
}

pub struct SessionOrchestrator {
    registry: SessionRegistry,
    quality: QualityEngine,
    broadcaster: Arc<EventBroadcaster>,
    config: EngineConfig,
    sweep_guard: Mutex<()>,
    /// Non-terminal sessions; kept in step with create and the first terminal transition
    live_sessions: AtomicUsize,
}

impl SessionOrchestrator {
    pub fn new(config: EngineConfig, broadcaster: Arc<EventBroadcaster>) -> Self {
        let quality = QualityEngine::new(config.device_latency_ms, config.bitrate_bounds);
        Self {
            registry: SessionRegistry::new(),
            quality,
            broadcaster,
            config,
            sweep_guard: Mutex::new(()),
            live_sessions: AtomicUsize::new(0),
        }
    }

    pub fn broadcaster(&self) -> &Arc<EventBroadcaster> {
        &self.broadcaster
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Register a new outbound call in `Connecting`
    pub fn create_session(&self, id: SessionId, destination: impl Into<String>) -> Result<CallSession> {
        let session = CallSession::new(id, destination, self.config.bitrate_bounds.initial);
        let snapshot = session.clone();
        self.registry.insert(session)?;

        counter!("callwatch_sessions_created_total").increment(1);
        let live = self.live_sessions.fetch_add(1, Ordering::Relaxed) + 1;
        gauge!("callwatch_active_sessions").set(live as f64);
        info!(session_id = %snapshot.id(), destination = snapshot.destination(), "Session created");
        Ok(snapshot)
    }

    /// Create a session with an engine-generated id
    pub fn create_session_with_generated_id(&self, destination: impl Into<String>) -> Result<CallSession> {
        self.create_session(SessionId::generate(), destination)
    }

    /// Apply a lifecycle trigger and publish `session_state_changed`
    pub fn transition(&self, id: &SessionId, trigger: SessionTrigger) -> Result<CallSession> {
        self.transition_at(id, trigger, Utc::now())
    }

    fn transition_at(&self, id: &SessionId, trigger: SessionTrigger, now: DateTime<Utc>) -> Result<CallSession> {
        self.transition_when(id, trigger, now, |_| true)?
            .ok_or_else(|| EngineError::SessionNotFound(id.clone()))
    }

    /// Apply `trigger` only if `precondition` still holds once the session is locked.
    /// Returns `None` when it does not.
    fn transition_when(
        &self,
        id: &SessionId,
        trigger: SessionTrigger,
        now: DateTime<Utc>,
        precondition: impl FnOnce(&CallSession) -> bool,
    ) -> Result<Option<CallSession>> {
        let handle = self.registry.handle(id)?;
        let snapshot = handle.with(|session| -> Result<Option<CallSession>> {
            if !precondition(session) {
                return Ok(None);
            }
            let change = session.apply(trigger, now)?;
            self.broadcaster
                .publish_event(EngineEvent::state_changed(id, &change, now));
            info!(session_id = %id, from = %change.from, to = %change.to, trigger = %trigger, "Session state changed");
            Ok(Some(session.clone()))
        })?;

        if let Some(session) = snapshot.as_ref().filter(|s| s.is_terminal()) {
            self.record_session_ended(session);
        }
        Ok(snapshot)
    }

    /// Called once per session, on the transition that made it terminal
    fn record_session_ended(&self, session: &CallSession) {
        counter!("callwatch_sessions_ended_total", "state" => session.state().as_str()).increment(1);
        let live = self
            .live_sessions
            .fetch_sub(1, Ordering::Relaxed)
            .saturating_sub(1);
        gauge!("callwatch_active_sessions").set(live as f64);
    }

    pub fn hold(&self, id: &SessionId) -> Result<CallSession> {
        self.transition(id, SessionTrigger::Hold)
    }

    pub fn resume(&self, id: &SessionId) -> Result<CallSession> {
        self.transition(id, SessionTrigger::Resume)
    }

    /// Terminate a session and record why.
    ///
    /// Ending a session that is already terminal returns it unchanged and
    /// publishes nothing, so duplicate hangup signals are harmless.
    pub fn end_session(&self, id: &SessionId, outcome: EndOutcome) -> Result<CallSession> {
        let handle = self.registry.handle(id)?;
        let now = Utc::now();

        let (snapshot, changed) = handle.with(|session| -> Result<(CallSession, bool)> {
            if session.is_terminal() {
                debug!(session_id = %id, "Session already terminal, ignoring end");
                return Ok((session.clone(), false));
            }
            let change = session.apply(SessionTrigger::Terminate, now)?;
            session.set_outcome(outcome);
            self.broadcaster
                .publish_event(EngineEvent::state_changed(id, &change, now));
            info!(
                session_id = %id,
                from = %change.from,
                outcome = session.outcome().map(|o| o.label()).unwrap_or_default(),
                "Session ended"
            );
            Ok((session.clone(), true))
        })?;

        if changed {
            self.record_session_ended(&snapshot);
        }
        Ok(snapshot)
    }

    /// Score a statistics sample, step the bitrate controller and publish
    /// `quality_update` (plus `bitrate_adjusted` when the target moves).
    pub fn record_sample(&self, id: &SessionId, sample: StatsSample) -> Result<SampleOutcome> {
        let handle = self.registry.handle(id)?;
        let now = Utc::now();

        let outcome = handle.with(|session| -> Result<SampleOutcome> {
            if session.is_terminal() {
                return Err(EngineError::SessionNotFound(id.clone()));
            }

            let assessment = self
                .quality
                .evaluate(&sample, session.bitrate_target_kbps(), now)?;
            session.record_quality(assessment.metrics.clone(), &assessment.bitrate)?;

            self.broadcaster.publish_event(EngineEvent::quality_update(
                id,
                &assessment.metrics,
                session.bitrate_target_kbps(),
            ));

            let bitrate_change = assessment.bitrate.change();
            if let Some(change) = bitrate_change {
                self.broadcaster
                    .publish_event(EngineEvent::bitrate_adjusted(id, change, now));
            }

            Ok(SampleOutcome {
                metrics: assessment.metrics,
                bitrate_change,
            })
        });

        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(session_id = %id, error = %e, "Sample rejected");
                return Err(e);
            }
        };

        counter!("callwatch_samples_total").increment(1);
        histogram!("callwatch_session_mos").record(outcome.metrics.mos);
        if let Some(change) = outcome.bitrate_change {
            counter!("callwatch_bitrate_adjustments_total", "direction" => change.direction()).increment(1);
            debug!(
                session_id = %id,
                old = change.old_bitrate_kbps,
                new = change.new_bitrate_kbps,
                "Bitrate adjusted"
            );
        }
        Ok(outcome)
    }

    pub fn start_recording(&self, id: &SessionId) -> Result<CallSession> {
        let handle = self.registry.handle(id)?;
        let now = Utc::now();
        handle.with(|session| -> Result<CallSession> {
            if session.start_recording(now)? {
                self.publish_recording(id, session, now);
                info!(session_id = %id, "Recording started");
            }
            Ok(session.clone())
        })
    }

    pub fn stop_recording(&self, id: &SessionId) -> Result<CallSession> {
        let handle = self.registry.handle(id)?;
        let now = Utc::now();
        Ok(handle.with(|session| {
            if session.stop_recording(now) {
                self.publish_recording(id, session, now);
                info!(session_id = %id, "Recording stopped");
            }
            session.clone()
        }))
    }

    fn publish_recording(&self, id: &SessionId, session: &CallSession, now: DateTime<Utc>) {
        if let Some(recording) = session.recording() {
            self.broadcaster
                .publish_event(EngineEvent::recording_changed(id, recording, now));
        }
    }

    pub fn get(&self, id: &SessionId) -> Result<CallSession> {
        self.registry.get(id)
    }

    /// Keep a session pinned in the registry while inspecting it.
    ///
    /// The eviction sweep skips sessions with an outstanding handle.
    pub fn observe(&self, id: &SessionId) -> Result<SessionHandle> {
        self.registry.handle(id)
    }

    /// Snapshot of all non-terminal sessions
    pub fn list_active(&self) -> Vec<CallSession> {
        self.registry.list_active()
    }

    /// Remove a terminal session. `Ok(false)` means it is being read right now.
    pub fn evict(&self, id: &SessionId) -> Result<bool> {
        let evicted = self.registry.evict(id)?;
        if evicted {
            debug!(session_id = %id, "Session evicted");
        }
        Ok(evicted)
    }

    /// Fail every session stuck in `Connecting`/`Ringing` past the timeout
    pub fn expire_stalled_sessions(&self, now: DateTime<Utc>) -> Vec<SessionId> {
        let stalled = self
            .registry
            .stalled_setup(self.config.ringing_timeout(), now);

        let mut expired = Vec::with_capacity(stalled.len());
        for id in stalled {
            match self.expire_if_stalled(&id, now) {
                Ok(true) => {
                    warn!(session_id = %id, "Session setup timed out");
                    expired.push(id);
                }
                Ok(false) => {}
                // Evicted between the scan and the transition
                Err(EngineError::SessionNotFound(_)) => {}
                Err(e) => warn!(session_id = %id, error = %e, "Failed to expire session"),
            }
        }
        expired
    }

    /// Fail the session if it is still stalled once locked. A session that
    /// moved on since the scan starts a fresh budget in its new state.
    fn expire_if_stalled(&self, id: &SessionId, now: DateTime<Utc>) -> Result<bool> {
        let timeout = self.config.ringing_timeout();
        let expired = self.transition_when(id, SessionTrigger::Timeout, now, |session| {
            session.setup_timed_out(timeout, now)
        })?;
        Ok(expired.is_some())
    }

    /// Evict terminal sessions whose retention window has elapsed
    pub fn sweep_terminal(&self, now: DateTime<Utc>) -> SweepReport {
        let Some(_guard) = self.sweep_guard.try_lock() else {
            return SweepReport {
                skipped: true,
                ..Default::default()
            };
        };

        let mut report = SweepReport::default();
        for id in self
            .registry
            .expired_terminal(self.config.terminal_retention(), now)
        {
            match self.evict(&id) {
                Ok(true) => report.evicted.push(id),
                Ok(false) => report.deferred.push(id),
                Err(e) => debug!(session_id = %id, error = %e, "Skipped eviction"),
            }
        }

        if !report.evicted.is_empty() {
            info!(evicted = report.evicted.len(), deferred = report.deferred.len(), "Eviction sweep completed");
        }
        report
    }

    pub fn statistics(&self) -> EngineStatistics {
        let sessions = self.registry.snapshot_all();
        let mut stats = EngineStatistics {
            total_sessions: sessions.len(),
            subscribers: self.broadcaster.subscriber_count(),
            ..Default::default()
        };

        let mut total_mos = 0.0;
        let mut mos_count = 0usize;

        for session in &sessions {
            match session.state() {
                SessionState::Connecting => stats.connecting += 1,
                SessionState::Ringing => stats.ringing += 1,
                SessionState::Active => stats.active += 1,
                SessionState::OnHold => stats.on_hold += 1,
                SessionState::Ended => stats.ended += 1,
                SessionState::Failed => stats.failed += 1,
            }
            if session.is_recording() {
                stats.recording += 1;
            }
            if !session.is_terminal() {
                stats.active_sessions += 1;
                if let Some(quality) = session.latest_quality() {
                    total_mos += quality.mos;
                    mos_count += 1;
                }
            }
        }

        if mos_count > 0 {
            stats.average_mos = Some(total_mos / mos_count as f64);
        }
        stats
    }

    /// Publish aggregate gauges on the `metrics` topic
    pub fn publish_system_metrics(&self) -> EngineStatistics {
        let stats = self.statistics();
        self.broadcaster.publish_event(EngineEvent::system_metrics(
            SystemMetricsPayload {
                active_sessions: stats.active_sessions,
                total_sessions: stats.total_sessions,
                subscribers: stats.subscribers,
                average_mos: stats.average_mos,
            },
            Utc::now(),
        ));
        stats
    }

    /// Number of non-terminal sessions, without touching any session lock
    pub fn live_session_count(&self) -> usize {
        self.live_sessions.load(Ordering::Relaxed)
    }
}
