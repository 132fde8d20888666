//! Outbound engine events
//!
//! Every event serializes as `{type, sessionId, timestamp, payload}`;
//! `sessionId` is omitted for system-wide events.

use crate::domain::quality::{BitrateChange, QualityGrade, QualityMetrics};
use crate::domain::session::{RecordingState, SessionState, SessionTrigger, StateChange};
use crate::domain::shared::{SessionId, Topic};
use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineEvent {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub body: EventBody,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum EventBody {
    SessionStateChanged(StateChangedPayload),
    QualityUpdate(QualityUpdatePayload),
    BitrateAdjusted(BitrateChange),
    RecordingStateChanged(RecordingState),
    SystemMetrics(SystemMetricsPayload),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StateChangedPayload {
    pub from: SessionState,
    pub to: SessionState,
    pub trigger: SessionTrigger,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QualityUpdatePayload {
    #[serde(flatten)]
    pub metrics: QualityMetrics,
    pub grade: QualityGrade,
    pub bitrate_target_kbps: u32,
}

/// Aggregate gauges published on the `metrics` topic
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemMetricsPayload {
    pub active_sessions: usize,
    pub total_sessions: usize,
    pub subscribers: usize,
    pub average_mos: Option<f64>,
}

impl EngineEvent {
    fn for_session(session_id: &SessionId, timestamp: DateTime<Utc>, body: EventBody) -> Self {
        Self {
            session_id: Some(session_id.clone()),
            timestamp,
            body,
        }
    }

    pub fn state_changed(session_id: &SessionId, change: &StateChange, at: DateTime<Utc>) -> Self {
        Self::for_session(
            session_id,
            at,
            EventBody::SessionStateChanged(StateChangedPayload {
                from: change.from,
                to: change.to,
                trigger: change.trigger,
            }),
        )
    }

    pub fn quality_update(session_id: &SessionId, metrics: &QualityMetrics, bitrate_target_kbps: u32) -> Self {
        Self::for_session(
            session_id,
            metrics.sampled_at,
            EventBody::QualityUpdate(QualityUpdatePayload {
                metrics: metrics.clone(),
                grade: metrics.grade(),
                bitrate_target_kbps,
            }),
        )
    }

    pub fn bitrate_adjusted(session_id: &SessionId, change: BitrateChange, at: DateTime<Utc>) -> Self {
        Self::for_session(session_id, at, EventBody::BitrateAdjusted(change))
    }

    pub fn recording_changed(session_id: &SessionId, recording: &RecordingState, at: DateTime<Utc>) -> Self {
        Self::for_session(session_id, at, EventBody::RecordingStateChanged(recording.clone()))
    }

    pub fn system_metrics(payload: SystemMetricsPayload, at: DateTime<Utc>) -> Self {
        Self {
            session_id: None,
            timestamp: at,
            body: EventBody::SystemMetrics(payload),
        }
    }

    /// Topic this event is published on
    pub fn topic(&self) -> Topic {
        match self.body {
            EventBody::SessionStateChanged(_)
            | EventBody::QualityUpdate(_)
            | EventBody::RecordingStateChanged(_) => Topic::calls(),
            EventBody::BitrateAdjusted(_) => Topic::quality(),
            EventBody::SystemMetrics(_) => Topic::metrics(),
        }
    }

    pub fn event_type(&self) -> &'static str {
        match self.body {
            EventBody::SessionStateChanged(_) => "session_state_changed",
            EventBody::QualityUpdate(_) => "quality_update",
            EventBody::BitrateAdjusted(_) => "bitrate_adjusted",
            EventBody::RecordingStateChanged(_) => "recording_state_changed",
            EventBody::SystemMetrics(_) => "system_metrics",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    #[test]
    fn test_state_changed_wire_format() {
        let change = StateChange {
            from: SessionState::Ringing,
            to: SessionState::Active,
            trigger: SessionTrigger::Answered,
        };
        let event = EngineEvent::state_changed(&SessionId::new("s1"), &change, Utc::now());
        let json: Value = serde_json::to_value(&event).unwrap();

        assert_eq!(json["type"], "session_state_changed");
        assert_eq!(json["sessionId"], "s1");
        assert!(json["timestamp"].is_string());
        assert_eq!(json["payload"]["from"], "ringing");
        assert_eq!(json["payload"]["to"], "active");
        assert_eq!(event.topic(), Topic::calls());
    }

    #[test]
    fn test_quality_update_wire_format() {
        let metrics = QualityMetrics {
            mos: 4.2,
            round_trip_time_ms: 40.0,
            jitter_ms: 5.0,
            packet_loss_percent: 0.0,
            latency_ms: 20.0,
            bitrate_kbps: 128.0,
            sampled_at: Utc::now(),
        };
        let event = EngineEvent::quality_update(&SessionId::new("s1"), &metrics, 144);
        let json: Value = serde_json::to_value(&event).unwrap();

        assert_eq!(json["type"], "quality_update");
        assert_eq!(json["payload"]["mos"], 4.2);
        assert_eq!(json["payload"]["roundTripTimeMs"], 40.0);
        assert_eq!(json["payload"]["grade"], "excellent");
        assert_eq!(json["payload"]["bitrateTargetKbps"], 144);
        assert_eq!(event.event_type(), "quality_update");
    }

    #[test]
    fn test_bitrate_adjusted_goes_to_quality_topic() {
        let change = BitrateChange {
            old_bitrate_kbps: 128,
            new_bitrate_kbps: 96,
        };
        let event = EngineEvent::bitrate_adjusted(&SessionId::new("s1"), change, Utc::now());
        let json: Value = serde_json::to_value(&event).unwrap();

        assert_eq!(json["payload"]["oldBitrateKbps"], 128);
        assert_eq!(json["payload"]["newBitrateKbps"], 96);
        assert_eq!(event.topic(), Topic::quality());
    }

    #[test]
    fn test_system_metrics_has_no_session_id() {
        let event = EngineEvent::system_metrics(
            SystemMetricsPayload {
                active_sessions: 2,
                total_sessions: 3,
                subscribers: 1,
                average_mos: None,
            },
            Utc::now(),
        );
        let json: Value = serde_json::to_value(&event).unwrap();
        assert!(json.get("sessionId").is_none());
        assert_eq!(json["type"], "system_metrics");
        assert_eq!(json["payload"]["activeSessions"], 2);
        assert_eq!(event.topic(), Topic::metrics());
    }
}
