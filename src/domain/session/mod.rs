//! Session bounded context - call session lifecycle and the registry that owns it

pub mod aggregate;
pub mod registry;
pub mod value_object;

pub use aggregate::{CallSession, StateChange};
pub use registry::{SessionHandle, SessionRegistry};
pub use value_object::{EndOutcome, RecordingState, SessionState, SessionTrigger};
