//! Subscription wire protocol
//!
//! Inbound control messages:
//!
//! ```json
//! {"action":"subscribe","topic":"calls"}
//! {"action":"unsubscribe","topic":"calls"}
//! {"action":"pong"}
//! ```
//!
//! Outbound messages are engine events plus a periodic liveness probe
//! `{"type":"ping","timestamp":"..."}`.

use crate::domain::events::EngineEvent;
use crate::domain::shared::Topic;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Control message sent by a subscriber
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ControlMessage {
    Subscribe { topic: Topic },
    Unsubscribe { topic: Topic },
    Pong,
}

impl ControlMessage {
    pub fn parse(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }
}

/// Message handed to a subscriber's transport
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundMessage {
    Event(Arc<EngineEvent>),
    Ping { timestamp: DateTime<Utc> },
}

#[derive(Serialize)]
struct PingFrame {
    #[serde(rename = "type")]
    kind: &'static str,
    timestamp: DateTime<Utc>,
}

impl OutboundMessage {
    pub fn ping() -> Self {
        OutboundMessage::Ping { timestamp: Utc::now() }
    }

    pub fn is_ping(&self) -> bool {
        matches!(self, OutboundMessage::Ping { .. })
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        match self {
            OutboundMessage::Event(event) => serde_json::to_string(event.as_ref()),
            OutboundMessage::Ping { timestamp } => serde_json::to_string(&PingFrame {
                kind: "ping",
                timestamp: *timestamp,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_control_messages() {
        assert_eq!(
            ControlMessage::parse(r#"{"action":"subscribe","topic":"calls"}"#).unwrap(),
            ControlMessage::Subscribe { topic: Topic::calls() }
        );
        assert_eq!(
            ControlMessage::parse(r#"{"action":"unsubscribe","topic":"quality"}"#).unwrap(),
            ControlMessage::Unsubscribe { topic: Topic::quality() }
        );
        assert_eq!(ControlMessage::parse(r#"{"action":"pong"}"#).unwrap(), ControlMessage::Pong);
    }

    #[test]
    fn test_unknown_action_rejected() {
        assert!(ControlMessage::parse(r#"{"action":"dial","topic":"calls"}"#).is_err());
        assert!(ControlMessage::parse("not json").is_err());
    }

    #[test]
    fn test_ping_frame() {
        let json: serde_json::Value = serde_json::from_str(&OutboundMessage::ping().to_json().unwrap()).unwrap();
        assert_eq!(json["type"], "ping");
        assert!(json["timestamp"].is_string());
    }
}
