//! Call session value objects

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Call session state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Origination submitted, no answer from the carrier yet
    Connecting,
    /// Remote party is being alerted
    Ringing,
    /// Call answered, media flowing
    Active,
    /// Call is on hold
    OnHold,
    /// Call terminated normally
    Ended,
    /// Call rejected, timed out or lost to a transport error
    Failed,
}

impl SessionState {
    /// Resolve the state reached by applying `trigger`, if the edge exists.
    pub fn next(&self, trigger: SessionTrigger) -> Option<SessionState> {
        use SessionState as S;
        use SessionTrigger as T;

        match (self, trigger) {
            // From Connecting
            (S::Connecting, T::Ringing) => Some(S::Ringing),
            (S::Connecting, T::Rejected | T::Timeout) => Some(S::Failed),

            // From Ringing
            (S::Ringing, T::Answered) => Some(S::Active),
            (S::Ringing, T::Rejected | T::Timeout) => Some(S::Failed),

            // Active and OnHold toggle; either may terminate
            (S::Active, T::Hold) => Some(S::OnHold),
            (S::OnHold, T::Resume) => Some(S::Active),
            (S::Active | S::OnHold, T::Terminate) => Some(S::Ended),

            // Fatal transport error from any live state
            (S::Connecting | S::Ringing | S::Active | S::OnHold, T::TransportError) => {
                Some(S::Failed)
            }

            // Terminal states accept nothing
            (S::Ended | S::Failed, _) => None,

            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Ended | SessionState::Failed)
    }

    /// Pre-answer states subject to the ringing timeout
    pub fn is_setup(&self) -> bool {
        matches!(self, SessionState::Connecting | SessionState::Ringing)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Connecting => "connecting",
            SessionState::Ringing => "ringing",
            SessionState::Active => "active",
            SessionState::OnHold => "on_hold",
            SessionState::Ended => "ended",
            SessionState::Failed => "failed",
        }
    }

    pub const ALL: [SessionState; 6] = [
        SessionState::Connecting,
        SessionState::Ringing,
        SessionState::Active,
        SessionState::OnHold,
        SessionState::Ended,
        SessionState::Failed,
    ];
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle event applied to a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionTrigger {
    /// Origination accepted, remote ringing
    Ringing,
    /// Remote answered
    Answered,
    /// Origination or answer rejected
    Rejected,
    Hold,
    Resume,
    Terminate,
    /// Fatal transport failure
    TransportError,
    /// Setup took longer than the ringing timeout (engine-internal)
    Timeout,
}

impl SessionTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionTrigger::Ringing => "ringing",
            SessionTrigger::Answered => "answered",
            SessionTrigger::Rejected => "rejected",
            SessionTrigger::Hold => "hold",
            SessionTrigger::Resume => "resume",
            SessionTrigger::Terminate => "terminate",
            SessionTrigger::TransportError => "transport_error",
            SessionTrigger::Timeout => "timeout",
        }
    }

    pub const ALL: [SessionTrigger; 8] = [
        SessionTrigger::Ringing,
        SessionTrigger::Answered,
        SessionTrigger::Rejected,
        SessionTrigger::Hold,
        SessionTrigger::Resume,
        SessionTrigger::Terminate,
        SessionTrigger::TransportError,
        SessionTrigger::Timeout,
    ];
}

impl fmt::Display for SessionTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome label recorded when a session is ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndOutcome {
    /// Normal call completion
    NormalClearing,
    /// Caller hung up
    CallerHangup,
    /// Callee hung up
    CalleeHangup,
    /// Remote party was busy
    Busy,
    /// Nobody answered
    NoAnswer,
    /// Voicemail or answering machine picked up
    Voicemail,
    /// Free-form label supplied by the caller
    Other(String),
}

impl EndOutcome {
    pub fn label(&self) -> &str {
        match self {
            EndOutcome::NormalClearing => "normal_clearing",
            EndOutcome::CallerHangup => "caller_hangup",
            EndOutcome::CalleeHangup => "callee_hangup",
            EndOutcome::Busy => "busy",
            EndOutcome::NoAnswer => "no_answer",
            EndOutcome::Voicemail => "voicemail",
            EndOutcome::Other(label) => label,
        }
    }
}

/// Recording state embedded in a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingState {
    pub active: bool,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub duration_seconds: Option<f64>,
}

impl RecordingState {
    pub fn start(at: DateTime<Utc>) -> Self {
        Self {
            active: true,
            started_at: at,
            ended_at: None,
            duration_seconds: None,
        }
    }

    pub fn stop(&mut self, at: DateTime<Utc>) {
        if !self.active {
            return;
        }
        self.active = false;
        self.ended_at = Some(at);
        self.duration_seconds = Some(seconds_between(self.started_at, at));
    }
}

/// Fractional seconds from `from` to `to`, never negative
pub(crate) fn seconds_between(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    let millis = (to - from).num_milliseconds().max(0);
    millis as f64 / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    const LEGAL_EDGES: &[(SessionState, SessionTrigger, SessionState)] = &[
        (SessionState::Connecting, SessionTrigger::Ringing, SessionState::Ringing),
        (SessionState::Connecting, SessionTrigger::Rejected, SessionState::Failed),
        (SessionState::Connecting, SessionTrigger::Timeout, SessionState::Failed),
        (SessionState::Connecting, SessionTrigger::TransportError, SessionState::Failed),
        (SessionState::Ringing, SessionTrigger::Answered, SessionState::Active),
        (SessionState::Ringing, SessionTrigger::Rejected, SessionState::Failed),
        (SessionState::Ringing, SessionTrigger::Timeout, SessionState::Failed),
        (SessionState::Ringing, SessionTrigger::TransportError, SessionState::Failed),
        (SessionState::Active, SessionTrigger::Hold, SessionState::OnHold),
        (SessionState::Active, SessionTrigger::Terminate, SessionState::Ended),
        (SessionState::Active, SessionTrigger::TransportError, SessionState::Failed),
        (SessionState::OnHold, SessionTrigger::Resume, SessionState::Active),
        (SessionState::OnHold, SessionTrigger::Terminate, SessionState::Ended),
        (SessionState::OnHold, SessionTrigger::TransportError, SessionState::Failed),
    ];

    #[test]
    fn test_every_pair_matches_the_edge_table() {
        for state in SessionState::ALL {
            for trigger in SessionTrigger::ALL {
                let expected = LEGAL_EDGES
                    .iter()
                    .find(|(from, on, _)| *from == state && *on == trigger)
                    .map(|(_, _, to)| *to);
                assert_eq!(state.next(trigger), expected, "{state} --{trigger}-->");
            }
        }
    }

    #[test]
    fn test_terminal_states() {
        assert!(SessionState::Ended.is_terminal());
        assert!(SessionState::Failed.is_terminal());
        assert!(!SessionState::OnHold.is_terminal());
        assert!(SessionState::Ringing.is_setup());
        assert!(!SessionState::Active.is_setup());
    }

    #[test]
    fn test_state_and_trigger_wire_names() {
        assert_eq!(serde_json::to_string(&SessionState::OnHold).unwrap(), "\"on_hold\"");
        let trigger: SessionTrigger = serde_json::from_str("\"transport_error\"").unwrap();
        assert_eq!(trigger, SessionTrigger::TransportError);
    }

    #[test]
    fn test_recording_stop_computes_duration() {
        let start = Utc::now();
        let mut recording = RecordingState::start(start);
        recording.stop(start + chrono::Duration::milliseconds(2500));
        assert!(!recording.active);
        assert_eq!(recording.duration_seconds, Some(2.5));

        // Stopping twice keeps the first end time
        recording.stop(start + chrono::Duration::seconds(10));
        assert_eq!(recording.duration_seconds, Some(2.5));
    }

    #[test]
    fn test_end_outcome_labels() {
        assert_eq!(EndOutcome::NoAnswer.label(), "no_answer");
        assert_eq!(EndOutcome::Other("dropped".to_string()).label(), "dropped");
    }
}
