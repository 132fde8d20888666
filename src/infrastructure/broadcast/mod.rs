//! Event broadcasting to topic subscribers

pub mod broadcaster;
pub mod protocol;
pub mod sink;

pub use broadcaster::{EventBroadcaster, HeartbeatReport, PublishReport, SubscriberInfo};
pub use protocol::{ControlMessage, OutboundMessage};
pub use sink::{ChannelSink, DeliveryError, SubscriberSink};
