//! Interface layer - network adapters

pub mod websocket;

pub use websocket::{router, WsState};
