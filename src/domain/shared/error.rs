//! Engine errors

use crate::domain::session::{SessionState, SessionTrigger};
use crate::domain::shared::value_objects::{SessionId, SubscriberId};
use thiserror::Error;

/// Errors returned to the immediate caller of an engine operation.
///
/// None of these are fatal: a failure on one session never affects
/// monitoring of the others.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error("Session not found: {0}")]
    SessionNotFound(SessionId),

    #[error("Session already exists: {0}")]
    DuplicateSession(SessionId),

    #[error("Invalid transition for session {session_id}: {trigger} is not allowed from {state}")]
    InvalidTransition {
        session_id: SessionId,
        state: SessionState,
        trigger: SessionTrigger,
    },

    #[error("Session {session_id} cannot record while {state}")]
    RecordingNotAllowed {
        session_id: SessionId,
        state: SessionState,
    },

    #[error("Invalid statistics sample: {0}")]
    InvalidSample(String),

    #[error("Subscriber not found: {0}")]
    SubscriberNotFound(SubscriberId),

    #[error("Session {0} is still live and cannot be evicted")]
    SessionNotEvictable(SessionId),

    #[error("Configuration error: {0}")]
    Config(String),
}
