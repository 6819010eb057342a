//! Per-node WebSocket sync sessions.

pub mod connection;
pub mod handler;
pub mod protocol;

pub use handler::{ws_router, WsState};
