//! Infrastructure layer - Technical implementations
//!
//! This layer contains:
//! - Event broadcasting to subscriber connections
//! - Subscriber transport seams

pub mod broadcast;
