//! Command table and async execution.
//!
//! The table is built once at startup from each domain's registrations and
//! is read-only afterwards.

pub mod params;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chatter_core::{ChatterError, Request};
use metrics::{counter, histogram};
use serde_json::Value;
use tracing::{error, warn};

use crate::connection::Connection;
use crate::domains::Domain;
use crate::hub::Hub;
use crate::metrics::{COMMAND_DURATION_SECONDS, COMMAND_ERRORS_TOTAL, COMMANDS_TOTAL};

/// Commands slower than this are logged.
const SLOW_COMMAND: Duration = Duration::from_secs(5);

/// Everything a handler may touch while executing.
pub struct CommandContext<'a> {
    /// The invoking connection.
    pub connection: &'a Arc<Connection>,
    /// Correlation id of the request.
    pub id: &'a Value,
    /// Shared hub state.
    pub hub: &'a Hub,
    /// Domain of the invoking connection.
    pub domain: &'a dyn Domain,
}

impl CommandContext<'_> {
    /// Identity of the invoking connection, or a handler failure if it has
    /// none.
    pub fn identity(&self) -> Result<String, ChatterError> {
        self.connection
            .identity()
            .ok_or_else(|| ChatterError::handler("connection has no identity"))
    }
}

/// Trait implemented by every command handler.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    /// Parameters that must be present and non-null before [`handle`] runs.
    ///
    /// [`handle`]: CommandHandler::handle
    fn required_params(&self) -> &'static [&'static str] {
        &[]
    }

    /// Execute with the request's params object.
    async fn handle(&self, params: Value, ctx: &CommandContext<'_>) -> Result<Value, ChatterError>;
}

/// (domain, group, method) a handler is registered under.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CommandKey {
    /// Domain namespace.
    pub domain: String,
    /// Command group.
    pub group: String,
    /// Command method.
    pub method: String,
}

impl CommandKey {
    /// Build a key.
    pub fn new(domain: &str, group: &str, method: &str) -> Self {
        Self {
            domain: domain.to_owned(),
            group: group.to_owned(),
            method: method.to_owned(),
        }
    }
}

/// Static mapping from (domain, group, method) to handler.
#[derive(Default)]
pub struct CommandTable {
    handlers: HashMap<CommandKey, Arc<dyn CommandHandler>>,
}

impl CommandTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler. A later registration for the same key wins.
    pub fn register(
        &mut self,
        domain: &str,
        group: &str,
        method: &str,
        handler: impl CommandHandler + 'static,
    ) {
        let _ = self
            .handlers
            .insert(CommandKey::new(domain, group, method), Arc::new(handler));
    }

    /// Look up a handler.
    pub fn resolve(
        &self,
        domain: &str,
        group: &str,
        method: &str,
    ) -> Option<Arc<dyn CommandHandler>> {
        self.handlers
            .get(&CommandKey::new(domain, group, method))
            .cloned()
    }

    /// Whether a handler exists.
    pub fn contains(&self, domain: &str, group: &str, method: &str) -> bool {
        self.handlers.contains_key(&CommandKey::new(domain, group, method))
    }

    /// `group.method` names registered for `domain`, sorted.
    pub fn commands(&self, domain: &str) -> Vec<String> {
        let mut names: Vec<String> = self
            .handlers
            .keys()
            .filter(|k| k.domain == domain)
            .map(|k| format!("{}.{}", k.group, k.method))
            .collect();
        names.sort();
        names
    }

    /// Total registered handlers.
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Whether nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Resolve, validate and run the request's command under `timeout`.
    pub async fn execute(
        &self,
        request: &Request,
        ctx: &CommandContext<'_>,
        timeout: Duration,
    ) -> Result<Value, ChatterError> {
        let domain = ctx.connection.domain();
        let Some(handler) = self.resolve(domain, &request.group, &request.method) else {
            counter!(
                COMMAND_ERRORS_TOTAL,
                "domain" => domain.to_owned(),
                "command" => "unknown",
                "error_kind" => "UNKNOWN_COMMAND"
            )
            .increment(1);
            return Err(ChatterError::UnknownCommand {
                domain: domain.to_owned(),
                group: request.group.clone(),
                method: request.method.clone(),
            });
        };

        let command = request.command_name();
        counter!(COMMANDS_TOTAL, "domain" => domain.to_owned(), "command" => command.clone())
            .increment(1);

        let start = Instant::now();
        let result = match params::check_required(&request.params, handler.required_params()) {
            Err(e) => Err(e),
            Ok(()) => {
                let run = handler.handle(request.params.clone(), ctx);
                match tokio::time::timeout(timeout, run).await {
                    Ok(result) => result,
                    Err(_elapsed) => {
                        error!(domain, command, "command timed out after {timeout:?}");
                        Err(ChatterError::Timeout {
                            elapsed_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                        })
                    }
                }
            }
        };

        let duration = start.elapsed();
        histogram!(
            COMMAND_DURATION_SECONDS,
            "domain" => domain.to_owned(),
            "command" => command.clone()
        )
        .record(duration.as_secs_f64());
        if duration >= SLOW_COMMAND {
            warn!(domain, command, duration_secs = duration.as_secs_f64(), "slow command");
        }
        if let Err(e) = &result {
            counter!(
                COMMAND_ERRORS_TOTAL,
                "domain" => domain.to_owned(),
                "command" => command,
                "error_kind" => e.kind().as_str()
            )
            .increment(1);
        }
        result
    }
}
