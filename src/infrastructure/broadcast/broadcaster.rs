//! Topic-based event broadcaster
//!
//! Subscribers are tracked in two places: a `DashMap` of per-connection state
//! (transport handle, topic set, heartbeat flag) and a topic index mapping
//! each topic to the sinks subscribed to it. Publishing clones the sink list
//! for the topic under a read lock and delivers after releasing it, so slow
//! or dead connections never hold up subscribe/unsubscribe.

use super::protocol::{ControlMessage, OutboundMessage};
use super::sink::SubscriberSink;
use crate::domain::events::EngineEvent;
use crate::domain::shared::{EngineError, Result, SubscriberId, Topic};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use metrics::{counter, gauge};
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

struct SubscriberEntry {
    sink: Arc<dyn SubscriberSink>,
    topics: HashSet<Topic>,
    connected_at: DateTime<Utc>,
    /// A probe was sent and no pong has come back yet
    awaiting_pong: bool,
}

/// Delivery summary for one publish
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishReport {
    pub delivered: usize,
    pub failed: usize,
}

/// Result of one heartbeat round
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeartbeatReport {
    pub probed: usize,
    pub disconnected: Vec<SubscriberId>,
}

/// Read-only view of a subscriber
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriberInfo {
    pub id: SubscriberId,
    pub topics: HashSet<Topic>,
    pub connected_at: DateTime<Utc>,
}

type TopicIndex = HashMap<Topic, HashMap<SubscriberId, Arc<dyn SubscriberSink>>>;

#[derive(Default)]
pub struct EventBroadcaster {
    subscribers: DashMap<SubscriberId, SubscriberEntry>,
    topics: RwLock<TopicIndex>,
}

impl EventBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new connection with no topics
    pub fn connect(&self, sink: Arc<dyn SubscriberSink>) -> SubscriberId {
        let id = SubscriberId::new();
        self.subscribers.insert(
            id,
            SubscriberEntry {
                sink,
                topics: HashSet::new(),
                connected_at: Utc::now(),
                awaiting_pong: false,
            },
        );
        gauge!("callwatch_subscribers").set(self.subscribers.len() as f64);
        info!(subscriber_id = %id, "Subscriber connected");
        id
    }

    /// Add `topic` to the subscriber's set. Idempotent.
    pub fn subscribe(&self, id: SubscriberId, topic: Topic) -> Result<()> {
        let mut entry = self
            .subscribers
            .get_mut(&id)
            .ok_or(EngineError::SubscriberNotFound(id))?;

        if entry.topics.insert(topic.clone()) {
            self.topics
                .write()
                .entry(topic.clone())
                .or_default()
                .insert(id, entry.sink.clone());
            debug!(subscriber_id = %id, topic = %topic, "Subscribed");
        }
        Ok(())
    }

    /// Remove `topic` from the subscriber's set. Idempotent.
    pub fn unsubscribe(&self, id: SubscriberId, topic: &Topic) -> Result<()> {
        let mut entry = self
            .subscribers
            .get_mut(&id)
            .ok_or(EngineError::SubscriberNotFound(id))?;

        if entry.topics.remove(topic) {
            let mut topics = self.topics.write();
            if let Some(members) = topics.get_mut(topic) {
                members.remove(&id);
                if members.is_empty() {
                    topics.remove(topic);
                }
            }
            debug!(subscriber_id = %id, topic = %topic, "Unsubscribed");
        }
        Ok(())
    }

    /// Drop a subscriber and all its memberships. Unknown ids are ignored.
    pub fn disconnect(&self, id: SubscriberId) -> bool {
        self.disconnect_with_reason(id, "closed")
    }

    fn disconnect_with_reason(&self, id: SubscriberId, reason: &'static str) -> bool {
        let Some((_, entry)) = self.subscribers.remove(&id) else {
            return false;
        };

        {
            let mut topics = self.topics.write();
            for topic in &entry.topics {
                if let Some(members) = topics.get_mut(topic) {
                    members.remove(&id);
                    if members.is_empty() {
                        topics.remove(topic);
                    }
                }
            }
        }

        counter!("callwatch_subscriber_disconnects_total", "reason" => reason).increment(1);
        gauge!("callwatch_subscribers").set(self.subscribers.len() as f64);
        info!(subscriber_id = %id, reason, "Subscriber disconnected");
        true
    }

    /// Deliver `event` to every subscriber of `topic`.
    ///
    /// Each send is independent: a failing connection is disconnected and
    /// the remaining subscribers still receive the event.
    pub fn publish(&self, topic: &Topic, event: EngineEvent) -> PublishReport {
        let targets: Vec<(SubscriberId, Arc<dyn SubscriberSink>)> = {
            let topics = self.topics.read();
            match topics.get(topic) {
                Some(members) => members.iter().map(|(id, sink)| (*id, sink.clone())).collect(),
                None => return PublishReport::default(),
            }
        };

        let message = OutboundMessage::Event(Arc::new(event));
        let mut report = PublishReport::default();

        for (id, sink) in targets {
            match sink.send(message.clone()) {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    report.failed += 1;
                    warn!(subscriber_id = %id, topic = %topic, error = %e, "Delivery failed, dropping subscriber");
                    self.disconnect_with_reason(id, e.reason());
                }
            }
        }

        report
    }

    /// Publish on the event's own topic
    pub fn publish_event(&self, event: EngineEvent) -> PublishReport {
        let topic = event.topic();
        self.publish(&topic, event)
    }

    /// Mark the subscriber as alive
    pub fn record_pong(&self, id: SubscriberId) -> Result<()> {
        let mut entry = self
            .subscribers
            .get_mut(&id)
            .ok_or(EngineError::SubscriberNotFound(id))?;
        entry.awaiting_pong = false;
        Ok(())
    }

    /// Apply a control message received from a subscriber
    pub fn handle_control(&self, id: SubscriberId, message: ControlMessage) -> Result<()> {
        match message {
            ControlMessage::Subscribe { topic } => self.subscribe(id, topic),
            ControlMessage::Unsubscribe { topic } => self.unsubscribe(id, &topic),
            ControlMessage::Pong => self.record_pong(id),
        }
    }

    /// One heartbeat round.
    ///
    /// Subscribers that have not answered the previous probe are
    /// disconnected; all others get a fresh probe.
    pub fn heartbeat(&self) -> HeartbeatReport {
        let mut report = HeartbeatReport::default();

        let snapshot: Vec<(SubscriberId, Arc<dyn SubscriberSink>, bool)> = self
            .subscribers
            .iter()
            .map(|entry| (*entry.key(), entry.sink.clone(), entry.awaiting_pong))
            .collect();

        for (id, sink, awaiting_pong) in snapshot {
            if awaiting_pong {
                if self.disconnect_with_reason(id, "heartbeat_timeout") {
                    report.disconnected.push(id);
                }
                continue;
            }

            // Flag before sending so a fast pong is not overwritten
            match self.subscribers.get_mut(&id) {
                Some(mut entry) => entry.awaiting_pong = true,
                None => continue,
            }

            match sink.send(OutboundMessage::ping()) {
                Ok(()) => report.probed += 1,
                Err(e) => {
                    debug!(subscriber_id = %id, error = %e, "Probe failed");
                    if self.disconnect_with_reason(id, e.reason()) {
                        report.disconnected.push(id);
                    }
                }
            }
        }

        if !report.disconnected.is_empty() {
            info!(count = report.disconnected.len(), "Heartbeat dropped dead subscribers");
        }
        report
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    pub fn is_connected(&self, id: SubscriberId) -> bool {
        self.subscribers.contains_key(&id)
    }

    /// Subscribers currently registered for `topic`
    pub fn topic_subscribers(&self, topic: &Topic) -> Vec<SubscriberId> {
        self.topics
            .read()
            .get(topic)
            .map(|members| members.keys().copied().collect())
            .unwrap_or_default()
    }

    pub fn subscriber(&self, id: SubscriberId) -> Option<SubscriberInfo> {
        self.subscribers.get(&id).map(|entry| SubscriberInfo {
            id,
            topics: entry.topics.clone(),
            connected_at: entry.connected_at,
        })
    }
}
