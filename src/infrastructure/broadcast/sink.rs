//! Subscriber transports

use super::protocol::OutboundMessage;
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("connection closed")]
    Closed,

    #[error("outbound queue full")]
    QueueFull,

    #[error("transport error: {0}")]
    Transport(String),
}

impl DeliveryError {
    pub fn reason(&self) -> &'static str {
        match self {
            DeliveryError::Closed => "closed",
            DeliveryError::QueueFull => "queue_full",
            DeliveryError::Transport(_) => "transport",
        }
    }
}

/// Transport handle for one subscriber connection
///
/// `send` must not block: it is called from publishing paths that run under
/// a session's lock.
#[cfg_attr(test, mockall::automock)]
pub trait SubscriberSink: Send + Sync {
    fn send(&self, message: OutboundMessage) -> Result<(), DeliveryError>;
}

/// Sink backed by a bounded tokio channel drained by the connection task
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<OutboundMessage>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::Sender<OutboundMessage>) -> Self {
        Self { tx }
    }

    /// Create a sink and the receiver its connection task drains
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<OutboundMessage>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self::new(tx), rx)
    }
}

impl SubscriberSink for ChannelSink {
    fn send(&self, message: OutboundMessage) -> Result<(), DeliveryError> {
        self.tx.try_send(message).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => DeliveryError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => DeliveryError::Closed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_channel_sink_delivers_in_order() {
        let (sink, mut rx) = ChannelSink::channel(8);
        sink.send(OutboundMessage::ping()).unwrap();
        sink.send(OutboundMessage::ping()).unwrap();

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        match (first, second) {
            (OutboundMessage::Ping { timestamp: a }, OutboundMessage::Ping { timestamp: b }) => {
                assert!(a <= b)
            }
            _ => panic!("Wrong message type"),
        }
    }

    #[test]
    fn test_channel_sink_reports_full_and_closed() {
        let (sink, rx) = ChannelSink::channel(1);
        sink.send(OutboundMessage::ping()).unwrap();
        assert_eq!(sink.send(OutboundMessage::ping()), Err(DeliveryError::QueueFull));

        drop(rx);
        assert_eq!(sink.send(OutboundMessage::ping()), Err(DeliveryError::Closed));
    }
}
