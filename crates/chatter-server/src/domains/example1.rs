//! Open demo domain with only the shared commands.

use chatter_core::Request;

use crate::commands::CommandTable;
use crate::connection::Connection;
use crate::domains::{AuthDecision, Domain};

/// Domain name.
pub const NAME: &str = "example1";

/// Open domain: every command runs without an identity.
pub struct Example1Domain;

impl Domain for Example1Domain {
    fn name(&self) -> &'static str {
        NAME
    }

    fn authorize(&self, _request: &Request, _connection: &Connection) -> AuthDecision {
        AuthDecision::Allow
    }

    fn register_commands(&self, _table: &mut CommandTable) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::make_connection;
    use serde_json::json;

    #[test]
    fn anonymous_connections_are_allowed() {
        let (conn, _rx) = make_connection("c1", NAME);
        let req = Request::new("event", "subscribe", json!({}), json!(1));
        assert_eq!(Example1Domain.authorize(&req, &conn), AuthDecision::Allow);
    }
}
