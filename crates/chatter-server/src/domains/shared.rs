//! Commands available in every domain: event subscriptions and `system.*`.

use async_trait::async_trait;
use chatter_core::ChatterError;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::instrument;

use crate::commands::params::parse;
use crate::commands::{CommandContext, CommandHandler, CommandTable};

/// Register the shared commands under `domain`.
pub fn register(table: &mut CommandTable, domain: &str) {
    table.register(domain, "event", "subscribe", SubscribeHandler);
    table.register(domain, "event", "unsubscribe", UnsubscribeHandler);
    table.register(domain, "system", "ping", PingHandler);
    table.register(domain, "system", "info", InfoHandler);
}

#[derive(Deserialize)]
struct SubscribeParams {
    group: String,
    event: String,
    #[serde(default)]
    params: Value,
    #[serde(default)]
    callback: Value,
}

/// `event.subscribe`: receive `group.event` events of this domain.
pub struct SubscribeHandler;

#[async_trait]
impl CommandHandler for SubscribeHandler {
    fn required_params(&self) -> &'static [&'static str] {
        &["group", "event"]
    }

    #[instrument(skip(self, ctx), fields(conn_id = %ctx.connection.id()))]
    async fn handle(&self, params: Value, ctx: &CommandContext<'_>) -> Result<Value, ChatterError> {
        let p: SubscribeParams = parse(params)?;
        ctx.hub
            .router()
            .subscribe(ctx.connection, &p.group, &p.event, p.params, p.callback);
        Ok(json!({}))
    }
}

#[derive(Deserialize)]
struct UnsubscribeParams {
    group: String,
    event: String,
}

/// `event.unsubscribe`: drop this connection's `group.event` subscriptions.
pub struct UnsubscribeHandler;

#[async_trait]
impl CommandHandler for UnsubscribeHandler {
    fn required_params(&self) -> &'static [&'static str] {
        &["group", "event"]
    }

    #[instrument(skip(self, ctx), fields(conn_id = %ctx.connection.id()))]
    async fn handle(&self, params: Value, ctx: &CommandContext<'_>) -> Result<Value, ChatterError> {
        let p: UnsubscribeParams = parse(params)?;
        let removed = ctx.hub.router().unsubscribe(ctx.connection, &p.group, &p.event);
        Ok(json!({ "removed": removed }))
    }
}

/// `system.ping`
pub struct PingHandler;

#[async_trait]
impl CommandHandler for PingHandler {
    async fn handle(
        &self,
        _params: Value,
        _ctx: &CommandContext<'_>,
    ) -> Result<Value, ChatterError> {
        Ok(json!({
            "pong": true,
            "timestamp": chrono::Utc::now().to_rfc3339(),
        }))
    }
}

/// `system.info`: who the server thinks this connection is.
pub struct InfoHandler;

#[async_trait]
impl CommandHandler for InfoHandler {
    async fn handle(
        &self,
        _params: Value,
        ctx: &CommandContext<'_>,
    ) -> Result<Value, ChatterError> {
        let conn = ctx.connection;
        Ok(json!({
            "domain": conn.domain(),
            "connectionId": conn.id(),
            "authorized": conn.is_authorized(),
            "identity": conn.identity(),
            "version": env!("CARGO_PKG_VERSION"),
        }))
    }
}
