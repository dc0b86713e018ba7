//! WebSocket transport.

pub mod session;
