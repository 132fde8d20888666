//! Call session aggregate root

use crate::domain::quality::{BitrateDecision, QualityMetrics};
use crate::domain::session::value_object::{
    seconds_between, EndOutcome, RecordingState, SessionState, SessionTrigger,
};
use crate::domain::shared::{EngineError, Result, SessionId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A state change applied to a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateChange {
    pub from: SessionState,
    pub to: SessionState,
    pub trigger: SessionTrigger,
}

/// Call session aggregate root
///
/// Enforces the lifecycle state machine. Once the session reaches `Ended` or
/// `Failed` every mutating method refuses to change it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallSession {
    id: SessionId,
    /// Outbound-dialed address
    destination: String,
    state: SessionState,
    created_at: DateTime<Utc>,
    /// When the current state was entered; drives the ringing timeout
    state_entered_at: DateTime<Utc>,
    connected_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
    duration_seconds: Option<f64>,
    latest_quality: Option<QualityMetrics>,
    bitrate_target_kbps: u32,
    recording: Option<RecordingState>,
    outcome: Option<EndOutcome>,
}

impl CallSession {
    pub fn new(id: SessionId, destination: impl Into<String>, initial_bitrate_kbps: u32) -> Self {
        Self::new_at(id, destination, initial_bitrate_kbps, Utc::now())
    }

    pub fn new_at(
        id: SessionId,
        destination: impl Into<String>,
        initial_bitrate_kbps: u32,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            destination: destination.into(),
            state: SessionState::Connecting,
            created_at: now,
            state_entered_at: now,
            connected_at: None,
            ended_at: None,
            duration_seconds: None,
            latest_quality: None,
            bitrate_target_kbps: initial_bitrate_kbps,
            recording: None,
            outcome: None,
        }
    }

    /// Apply a lifecycle trigger
    pub fn apply(&mut self, trigger: SessionTrigger, now: DateTime<Utc>) -> Result<StateChange> {
        let from = self.state;
        let to = from.next(trigger).ok_or_else(|| EngineError::InvalidTransition {
            session_id: self.id.clone(),
            state: from,
            trigger,
        })?;

        self.state = to;
        self.state_entered_at = now;

        if to == SessionState::Active && self.connected_at.is_none() {
            self.connected_at = Some(now);
        }

        if to.is_terminal() {
            self.ended_at = Some(now);
            self.duration_seconds = Some(
                self.connected_at
                    .map(|connected| seconds_between(connected, now))
                    .unwrap_or(0.0),
            );
            if let Some(recording) = self.recording.as_mut() {
                recording.stop(now);
            }
        }

        Ok(StateChange { from, to, trigger })
    }

    /// Store a quality assessment; the session must still be live
    pub fn record_quality(&mut self, metrics: QualityMetrics, bitrate: &BitrateDecision) -> Result<()> {
        if self.state.is_terminal() {
            return Err(EngineError::SessionNotFound(self.id.clone()));
        }
        self.latest_quality = Some(metrics);
        self.bitrate_target_kbps = bitrate.target_kbps;
        Ok(())
    }

    /// Start recording. Returns false when a recording is already running.
    pub fn start_recording(&mut self, now: DateTime<Utc>) -> Result<bool> {
        if !matches!(self.state, SessionState::Active | SessionState::OnHold) {
            return Err(EngineError::RecordingNotAllowed {
                session_id: self.id.clone(),
                state: self.state,
            });
        }
        if self.is_recording() {
            return Ok(false);
        }
        self.recording = Some(RecordingState::start(now));
        Ok(true)
    }

    /// Stop recording. Returns false when nothing was recording.
    pub fn stop_recording(&mut self, now: DateTime<Utc>) -> bool {
        match self.recording.as_mut() {
            Some(recording) if recording.active => {
                recording.stop(now);
                true
            }
            _ => false,
        }
    }

    pub(crate) fn set_outcome(&mut self, outcome: EndOutcome) {
        self.outcome = Some(outcome);
    }

    /// Time since the last quality sample, if any
    pub fn quality_staleness(&self, now: DateTime<Utc>) -> Option<chrono::Duration> {
        self.latest_quality.as_ref().map(|q| q.staleness(now))
    }

    /// Whether a setup-phase session has exceeded `timeout`
    pub fn setup_timed_out(&self, timeout: chrono::Duration, now: DateTime<Utc>) -> bool {
        self.state.is_setup() && now - self.state_entered_at >= timeout
    }

    /// Whether a terminal session has outlived its retention window
    pub fn retention_elapsed(&self, retention: chrono::Duration, now: DateTime<Utc>) -> bool {
        match self.ended_at {
            Some(ended_at) if self.state.is_terminal() => now - ended_at >= retention,
            _ => false,
        }
    }

    // Getters
    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn destination(&self) -> &str {
        &self.destination
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn state_entered_at(&self) -> DateTime<Utc> {
        self.state_entered_at
    }

    pub fn connected_at(&self) -> Option<DateTime<Utc>> {
        self.connected_at
    }

    pub fn ended_at(&self) -> Option<DateTime<Utc>> {
        self.ended_at
    }

    /// Talk time; only meaningful once the session has ended
    pub fn duration_seconds(&self) -> Option<f64> {
        self.duration_seconds
    }

    pub fn latest_quality(&self) -> Option<&QualityMetrics> {
        self.latest_quality.as_ref()
    }

    pub fn bitrate_target_kbps(&self) -> u32 {
        self.bitrate_target_kbps
    }

    pub fn recording(&self) -> Option<&RecordingState> {
        self.recording.as_ref()
    }

    pub fn is_recording(&self) -> bool {
        self.recording.as_ref().map(|r| r.active).unwrap_or(false)
    }

    pub fn outcome(&self) -> Option<&EndOutcome> {
        self.outcome.as_ref()
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }
}
