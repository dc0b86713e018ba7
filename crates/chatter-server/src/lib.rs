//! # chatter-server
//!
//! Connection registry, event routing and command dispatch behind an axum
//! websocket front end.
//!
//! - [`hub`]: process-wide state shared by every connection task
//! - [`dispatcher`]: decode, authorize, execute, reply
//! - [`events`]: direct emits and subscription broadcasts
//! - [`domains`]: the `chat`, `example1` and `example2` applications
//! - [`server`]: HTTP routes, websocket upgrade and graceful shutdown

#![deny(unsafe_code)]

pub mod cache;
pub mod commands;
pub mod connection;
pub mod dispatcher;
pub mod domains;
pub mod events;
pub mod health;
pub mod hub;
pub mod metrics;
pub mod registry;
pub mod server;
pub mod shutdown;
pub mod websocket;

#[cfg(test)]
mod test_helpers;

pub use connection::{Connection, ConnectionState};
pub use dispatcher::{Dispatcher, Outcome};
pub use domains::{AuthDecision, Domain};
pub use hub::Hub;
pub use server::{ChatterServer, ServerError};
