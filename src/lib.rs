//! Callwatch - real-time call-session lifecycle and quality monitoring
//!
//! Tracks voice-call sessions through their lifecycle, scores transport
//! statistics into MOS and a bitrate target, and fans session and quality
//! events out to topic subscribers.

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod interface;
pub mod telemetry;

// Re-export commonly used types
pub use domain::shared::error::EngineError;
pub use domain::shared::result::Result;
