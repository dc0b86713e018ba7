//! # chatter-core
//!
//! Shared types for the chatter connection hub:
//!
//! - [`envelope`]: inbound request, outbound response and event payload shapes
//! - [`errors`]: the dispatch error taxonomy and its wire encoding
//! - [`ids`]: connection id derivation from handshake facts

#![deny(unsafe_code)]

pub mod envelope;
pub mod errors;
pub mod ids;

pub use envelope::{ErrorEntry, EventPayload, Request, Response};
pub use errors::{ChatterError, ErrorCodeStyle, ErrorKind};
pub use ids::ConnectionId;
