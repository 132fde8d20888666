//! Shared kernel - Common types used across the session, quality and broadcast contexts

pub mod error;
pub mod result;
pub mod value_objects;

pub use error::EngineError;
pub use result::Result;
pub use value_objects::*;
