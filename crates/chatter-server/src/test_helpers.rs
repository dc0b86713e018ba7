//! Constructors shared by unit tests.

use std::sync::Arc;

use chatter_core::{ChatterError, ConnectionId, Request};
use chatter_settings::ChatterSettings;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::commands::CommandContext;
use crate::connection::Connection;
use crate::hub::Hub;

/// Open connection with a roomy queue.
pub fn make_connection(id: &str, domain: &str) -> (Arc<Connection>, mpsc::Receiver<Arc<String>>) {
    Connection::channel(ConnectionId::from_raw(id), domain, "127.0.0.1:9", 64)
}

/// Hub with default settings and the built-in domains.
pub fn make_hub() -> Hub {
    Hub::with_builtin_domains(ChatterSettings::default())
}

/// Parse every queued frame.
pub fn drain(rx: &mut mpsc::Receiver<Arc<String>>) -> Vec<Value> {
    let mut frames = Vec::new();
    while let Ok(frame) = rx.try_recv() {
        frames.push(serde_json::from_str(&frame).unwrap());
    }
    frames
}

/// Run a command straight through the table, skipping authorization.
pub async fn run_command(
    hub: &Hub,
    connection: &Arc<Connection>,
    group: &str,
    method: &str,
    params: Value,
) -> Result<Value, ChatterError> {
    let request = Request::new(group, method, params, Value::from(1));
    let domain = hub.domain(connection.domain()).unwrap();
    let ctx = CommandContext {
        connection,
        id: &request.id,
        hub,
        domain: domain.as_ref(),
    };
    hub.commands()
        .execute(&request, &ctx, hub.settings().dispatch.command_timeout())
        .await
}
