//! Application domains served by the hub.
//!
//! A domain owns a command namespace, an authorization gate and the
//! connection lifecycle hooks. Every domain also gets the shared
//! `event.*` and `system.*` commands.

pub mod chat;
pub mod example1;
pub mod example2;
pub mod shared;

use std::sync::Arc;

use async_trait::async_trait;
use chatter_core::errors::ACCESS_DENIED_MESSAGE;
use chatter_core::{ChatterError, Request};
use serde_json::Value;

use crate::commands::CommandTable;
use crate::connection::Connection;
use crate::hub::Hub;

/// Group whose commands never need an identity.
pub const SYSTEM_GROUP: &str = "system";

/// Verdict of a domain's authorization gate.
#[derive(Clone, Debug, PartialEq)]
pub enum AuthDecision {
    /// Run the command.
    Allow,
    /// Reject with an access-denied error; the connection stays open.
    Deny {
        /// Explicit wire code, if the domain wants one.
        code: Option<i64>,
        /// Client-visible message.
        message: String,
    },
    /// Skip the command and reply with this body instead.
    Override {
        /// Reply body.
        response: Value,
        /// Reply success flag.
        success: bool,
    },
}

impl AuthDecision {
    /// Standard access-denied verdict.
    pub fn deny() -> Self {
        Self::Deny {
            code: None,
            message: ACCESS_DENIED_MESSAGE.into(),
        }
    }
}

/// An application namespace plugged into the dispatcher.
#[async_trait]
pub trait Domain: Send + Sync {
    /// Namespace name, also the websocket path.
    fn name(&self) -> &'static str;

    /// Commands allowed before the connection has an identity.
    fn is_pre_auth_exempt(&self, request: &Request) -> bool {
        request.group == SYSTEM_GROUP
    }

    /// Gate every request before it reaches the command table.
    fn authorize(&self, request: &Request, connection: &Connection) -> AuthDecision {
        if connection.is_authorized() || self.is_pre_auth_exempt(request) {
            AuthDecision::Allow
        } else {
            AuthDecision::deny()
        }
    }

    /// Add this domain's own commands.
    fn register_commands(&self, table: &mut CommandTable);

    /// Transport opened.
    async fn on_connect(
        &self,
        _connection: &Arc<Connection>,
        _hub: &Hub,
    ) -> Result<(), ChatterError> {
        Ok(())
    }

    /// Transport closed.
    async fn on_disconnect(
        &self,
        _connection: &Arc<Connection>,
        _hub: &Hub,
    ) -> Result<(), ChatterError> {
        Ok(())
    }

    /// An identity was registered for `connection`.
    async fn on_user_online(
        &self,
        _connection: &Arc<Connection>,
        _identity: &str,
        _hub: &Hub,
    ) -> Result<(), ChatterError> {
        Ok(())
    }

    /// `connection` released its identity.
    async fn on_user_offline(
        &self,
        _connection: &Arc<Connection>,
        _identity: &str,
        _hub: &Hub,
    ) -> Result<(), ChatterError> {
        Ok(())
    }
}

/// The domains served by default: `chat`, `example1` and `example2`.
pub fn builtin_domains() -> Vec<Arc<dyn Domain>> {
    vec![
        Arc::new(chat::ChatDomain),
        Arc::new(example1::Example1Domain),
        Arc::new(example2::Example2Domain),
    ]
}

/// Build the command table for `domains`.
///
/// Shared commands go in first so a domain may override them.
pub fn build_table(domains: &[Arc<dyn Domain>]) -> CommandTable {
    let mut table = CommandTable::new();
    for domain in domains {
        shared::register(&mut table, domain.name());
        domain.register_commands(&mut table);
    }
    table
}
