//! Domain layer - Core engine logic and rules
//!
//! This layer contains:
//! - Session: the call-session aggregate, its state machine and registry
//! - Quality: MOS scoring and adaptive bitrate control (pure functions)
//! - Events: the outbound event envelope
//! - Shared: errors and value objects used everywhere

pub mod events;
pub mod quality;
pub mod session;
pub mod shared;

// Re-export commonly used types
pub use shared::{EngineError, Result};
