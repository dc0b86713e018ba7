//! Multi-user chat: one connection per username, broadcast messages,
//! presence events and a history backfill.

use std::sync::Arc;

use async_trait::async_trait;
use chatter_core::{ChatterError, Request};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, info, instrument};

use crate::commands::params::parse;
use crate::commands::{CommandContext, CommandHandler, CommandTable};
use crate::connection::Connection;
use crate::domains::{Domain, SYSTEM_GROUP};
use crate::hub::Hub;

/// Domain name.
pub const NAME: &str = "chat";

/// The chat domain. Everything except `user.auth` and `system.*` requires
/// a username.
pub struct ChatDomain;

#[async_trait]
impl Domain for ChatDomain {
    fn name(&self) -> &'static str {
        NAME
    }

    fn is_pre_auth_exempt(&self, request: &Request) -> bool {
        request.group == SYSTEM_GROUP || (request.group == "user" && request.method == "auth")
    }

    fn register_commands(&self, table: &mut CommandTable) {
        table.register(NAME, "user", "auth", AuthHandler);
        table.register(NAME, "chat", "message", MessageHandler);
        table.register(NAME, "chat", "private", PrivateHandler);
        table.register(NAME, "chat", "users", UsersHandler);
        table.register(NAME, "chat", "history", HistoryHandler);
    }

    async fn on_user_online(
        &self,
        connection: &Arc<Connection>,
        identity: &str,
        hub: &Hub,
    ) -> Result<(), ChatterError> {
        info!(identity, conn_id = %connection.id(), "user online");
        let _ = hub
            .router()
            .broadcast(connection, NAME, "user", "on", json!({ "user": identity }));
        Ok(())
    }

    async fn on_user_offline(
        &self,
        connection: &Arc<Connection>,
        identity: &str,
        hub: &Hub,
    ) -> Result<(), ChatterError> {
        info!(identity, conn_id = %connection.id(), "user offline");
        let _ = hub
            .router()
            .broadcast(connection, NAME, "user", "off", json!({ "user": identity }));
        Ok(())
    }
}

/// Credentials are not checked; a `password` key is accepted and ignored.
#[derive(Deserialize)]
struct AuthParams {
    username: String,
}

/// `user.auth`: claim a username.
pub struct AuthHandler;

#[async_trait]
impl CommandHandler for AuthHandler {
    fn required_params(&self) -> &'static [&'static str] {
        &["username"]
    }

    #[instrument(skip(self, params, ctx), fields(conn_id = %ctx.connection.id()))]
    async fn handle(&self, params: Value, ctx: &CommandContext<'_>) -> Result<Value, ChatterError> {
        let p: AuthParams = parse(params)?;
        if p.username.trim().is_empty() {
            return Err(ChatterError::InvalidParams {
                message: "username must not be empty".into(),
            });
        }
        ctx.hub
            .claim_identity(ctx.connection, &p.username, ctx.domain)
            .await?;
        Ok(json!({}))
    }
}

#[derive(Deserialize)]
struct MessageParams {
    message: String,
}

/// `chat.message`: broadcast to every `chat.message` subscriber.
pub struct MessageHandler;

#[async_trait]
impl CommandHandler for MessageHandler {
    fn required_params(&self) -> &'static [&'static str] {
        &["message"]
    }

    #[instrument(skip(self, params, ctx), fields(conn_id = %ctx.connection.id()))]
    async fn handle(&self, params: Value, ctx: &CommandContext<'_>) -> Result<Value, ChatterError> {
        let p: MessageParams = parse(params)?;
        let user = ctx.identity()?;
        let delivered = ctx.hub.router().broadcast(
            ctx.connection,
            NAME,
            "chat",
            "message",
            json!({ "user": user, "message": p.message }),
        );
        debug!(user, delivered, "chat message broadcast");
        Ok(json!({}))
    }
}

#[derive(Deserialize)]
struct PrivateParams {
    username: String,
    message: String,
}

/// `chat.private`: deliver a message to one named user.
pub struct PrivateHandler;

#[async_trait]
impl CommandHandler for PrivateHandler {
    fn required_params(&self) -> &'static [&'static str] {
        &["username", "message"]
    }

    #[instrument(skip(self, params, ctx), fields(conn_id = %ctx.connection.id()))]
    async fn handle(&self, params: Value, ctx: &CommandContext<'_>) -> Result<Value, ChatterError> {
        let p: PrivateParams = parse(params)?;
        let user = ctx.identity()?;
        let delivered = match ctx.hub.registry().lookup(&p.username) {
            Some(target) if target.is_online() => {
                ctx.hub.router().emit(
                    &target,
                    "chat",
                    "message",
                    json!({ "user": user, "message": p.message }),
                ) > 0
            }
            _ => false,
        };
        Ok(json!({ "delivered": delivered }))
    }
}

/// `chat.users`: push the sorted username list to the caller.
pub struct UsersHandler;

#[async_trait]
impl CommandHandler for UsersHandler {
    async fn handle(
        &self,
        _params: Value,
        ctx: &CommandContext<'_>,
    ) -> Result<Value, ChatterError> {
        let users = ctx.hub.registry().identities();
        let _ = ctx
            .hub
            .router()
            .emit(ctx.connection, "chat", "users", json!({ "users": users }));
        Ok(json!({}))
    }
}

/// `chat.history`: recent broadcasts of this domain, oldest first.
pub struct HistoryHandler;

#[async_trait]
impl CommandHandler for HistoryHandler {
    async fn handle(
        &self,
        _params: Value,
        ctx: &CommandContext<'_>,
    ) -> Result<Value, ChatterError> {
        let messages = ctx.hub.router().history(NAME);
        Ok(json!({ "messages": messages }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{drain, make_connection, make_hub, run_command};
    use assert_matches::assert_matches;

    async fn login(
        hub: &Hub,
        id: &str,
        username: &str,
    ) -> (Arc<Connection>, tokio::sync::mpsc::Receiver<Arc<String>>) {
        let (conn, rx) = make_connection(id, NAME);
        let params = json!({"username": username, "password": "x"});
        let _ = run_command(hub, &conn, "user", "auth", params).await.unwrap();
        (conn, rx)
    }

    fn subscribe(hub: &Hub, conn: &Arc<Connection>, group: &str, method: &str) {
        hub.router().subscribe(conn, group, method, Value::Null, json!(1));
    }

    #[test]
    fn auth_and_system_are_exempt() {
        let domain = ChatDomain;
        assert!(domain.is_pre_auth_exempt(&Request::new("user", "auth", json!({}), json!(1))));
        assert!(domain.is_pre_auth_exempt(&Request::new("system", "info", json!({}), json!(1))));
        assert!(!domain.is_pre_auth_exempt(&Request::new("chat", "message", json!({}), json!(1))));
        let subscribe = Request::new("event", "subscribe", json!({}), json!(1));
        assert!(!domain.is_pre_auth_exempt(&subscribe));
    }

    #[tokio::test]
    async fn auth_registers_username() {
        let hub = make_hub();
        let (conn, _rx) = login(&hub, "c1", "alice").await;
        assert!(conn.is_authorized());
        assert_eq!(hub.registry().identities(), vec!["alice".to_string()]);
    }

    #[tokio::test]
    async fn auth_requires_username() {
        let hub = make_hub();
        let (conn, _rx) = make_connection("c1", NAME);
        let err = run_command(&hub, &conn, "user", "auth", json!({"password": "x"}))
            .await
            .unwrap_err();
        assert_matches!(err, ChatterError::MissingParam { ref name } if name == "username");
    }

    #[tokio::test]
    async fn duplicate_auth_fails() {
        let hub = make_hub();
        let (_first, _rx1) = login(&hub, "c1", "alice").await;
        let (second, _rx2) = make_connection("c2", NAME);
        let err = run_command(&hub, &second, "user", "auth", json!({"username": "alice"}))
            .await
            .unwrap_err();
        assert!(err.closes_connection());
    }

    #[tokio::test]
    async fn online_broadcast_reaches_presence_subscribers() {
        let hub = make_hub();
        let (watcher, mut rx) = login(&hub, "c1", "alice").await;
        subscribe(&hub, &watcher, "user", "on");
        let (_bob, _rx2) = login(&hub, "c2", "bob").await;
        let frames = drain(&mut rx);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0]["response"]["event"], "user.on");
        assert_eq!(frames[0]["response"]["params"]["user"], "bob");
    }

    #[tokio::test]
    async fn message_broadcasts_with_sender() {
        let hub = make_hub();
        let (alice, mut rx_a) = login(&hub, "c1", "alice").await;
        let (bob, mut rx_b) = login(&hub, "c2", "bob").await;
        subscribe(&hub, &bob, "chat", "message");

        let out = run_command(&hub, &alice, "chat", "message", json!({"message": "hi"}))
            .await
            .unwrap();
        assert_eq!(out, json!({}));
        let frames = drain(&mut rx_b);
        assert_eq!(frames[0]["response"]["params"], json!({"user": "alice", "message": "hi"}));
        assert!(drain(&mut rx_a).is_empty());
        assert_eq!(hub.router().history(NAME).len(), 3);
    }

    #[tokio::test]
    async fn private_message_reaches_only_target() {
        let hub = make_hub();
        let (alice, mut rx_a) = login(&hub, "c1", "alice").await;
        let (_bob, mut rx_b) = login(&hub, "c2", "bob").await;
        let params = json!({"username": "bob", "message": "psst"});
        let out = run_command(&hub, &alice, "chat", "private", params).await.unwrap();
        assert_eq!(out["delivered"], true);
        let frames = drain(&mut rx_b);
        assert_eq!(frames[0]["response"]["params"]["message"], "psst");
        assert!(drain(&mut rx_a).is_empty());

        let params = json!({"username": "nobody", "message": "?"});
        let out = run_command(&hub, &alice, "chat", "private", params).await.unwrap();
        assert_eq!(out["delivered"], false);
    }

    #[tokio::test]
    async fn users_emits_sorted_list() {
        let hub = make_hub();
        let (_zed, _rx_z) = login(&hub, "c1", "zed").await;
        let (amy, mut rx_a) = login(&hub, "c2", "amy").await;
        let _ = run_command(&hub, &amy, "chat", "users", json!({})).await.unwrap();
        let frames = drain(&mut rx_a);
        assert_eq!(frames[0]["response"]["event"], "chat.users");
        assert_eq!(frames[0]["response"]["params"]["users"], json!(["amy", "zed"]));
    }

    #[tokio::test]
    async fn history_returns_cached_broadcasts() {
        let hub = make_hub();
        let (alice, _rx) = login(&hub, "c1", "alice").await;
        let _ = run_command(&hub, &alice, "chat", "message", json!({"message": "one"}))
            .await
            .unwrap();
        let out = run_command(&hub, &alice, "chat", "history", json!({})).await.unwrap();
        let messages = out["messages"].as_array().unwrap();
        assert_eq!(messages.last().unwrap()["event"], "chat.message");
        assert_eq!(messages.last().unwrap()["params"]["message"], "one");
    }
}
