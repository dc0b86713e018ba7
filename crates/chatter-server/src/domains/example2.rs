//! Open demo domain that pushes a direct event and a broadcast on request.

use async_trait::async_trait;
use chatter_core::{ChatterError, Request};
use serde_json::{Value, json};

use crate::commands::{CommandContext, CommandHandler, CommandTable};
use crate::connection::Connection;
use crate::domains::{AuthDecision, Domain};

/// Domain name.
pub const NAME: &str = "example2";

/// Open domain with `test.send_events`.
pub struct Example2Domain;

impl Domain for Example2Domain {
    fn name(&self) -> &'static str {
        NAME
    }

    fn authorize(&self, _request: &Request, _connection: &Connection) -> AuthDecision {
        AuthDecision::Allow
    }

    fn register_commands(&self, table: &mut CommandTable) {
        table.register(NAME, "test", "send_events", SendEventsHandler);
    }
}

/// `test.send_events`: emit `test.event1` to the caller and broadcast
/// `test.event2` to its subscribers.
pub struct SendEventsHandler;

#[async_trait]
impl CommandHandler for SendEventsHandler {
    async fn handle(
        &self,
        _params: Value,
        ctx: &CommandContext<'_>,
    ) -> Result<Value, ChatterError> {
        let router = ctx.hub.router();
        let _ = router.emit(
            ctx.connection,
            "test",
            "event1",
            json!({ "hello": "world", "foo": "bar" }),
        );
        let _ = router.broadcast(
            ctx.connection,
            NAME,
            "test",
            "event2",
            json!({ "someparam": "somevalue" }),
        );
        Ok(json!({}))
    }
}
