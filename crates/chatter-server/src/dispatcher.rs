//! Per-message control loop: decode, authorize, execute, reply.

use std::sync::Arc;

use chatter_core::{ChatterError, ErrorKind, Request, Response};
use metrics::{counter, gauge, histogram};
use tracing::{debug, error, info, instrument, warn};

use crate::commands::CommandContext;
use crate::connection::{Connection, ConnectionState};
use crate::domains::{AuthDecision, Domain};
use crate::hub::Hub;
use crate::metrics::{
    WS_CONNECTION_DURATION_SECONDS, WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL,
    WS_DISCONNECTIONS_TOTAL,
};

/// Reply to one inbound message.
#[derive(Clone, Debug)]
pub struct Outcome {
    /// Envelope to send back.
    pub response: Response,
    /// Close the connection once the envelope is flushed.
    pub close: bool,
}

impl Outcome {
    fn reply(response: Response) -> Self {
        Self {
            response,
            close: false,
        }
    }
}

/// Dispatches messages arriving on connections of one domain.
#[derive(Clone)]
pub struct Dispatcher {
    hub: Arc<Hub>,
    domain: Arc<dyn Domain>,
}

impl Dispatcher {
    /// Create a dispatcher for `domain`.
    pub fn new(hub: Arc<Hub>, domain: Arc<dyn Domain>) -> Self {
        Self { hub, domain }
    }

    /// Shared hub.
    pub fn hub(&self) -> &Arc<Hub> {
        &self.hub
    }

    /// Served domain.
    pub fn domain(&self) -> &Arc<dyn Domain> {
        &self.domain
    }

    /// Start tracking a freshly opened connection and run `on_connect`.
    ///
    /// Returns `false` and closes the connection when its id is already
    /// held by another live connection.
    pub async fn open(&self, connection: &Arc<Connection>) -> bool {
        if !self.hub.track(connection) {
            connection.close();
            return false;
        }
        info!(
            conn_id = %connection.id(),
            domain = connection.domain(),
            remote = connection.remote(),
            "client connected"
        );
        counter!(WS_CONNECTIONS_TOTAL, "domain" => self.domain.name()).increment(1);
        gauge!(WS_CONNECTIONS_ACTIVE).increment(1.0);

        let timeout = self.hub.settings().dispatch.command_timeout();
        match tokio::time::timeout(timeout, self.domain.on_connect(connection, &self.hub)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(conn_id = %connection.id(), error = %e, "on_connect hook failed"),
            Err(_) => warn!(conn_id = %connection.id(), "on_connect hook timed out"),
        }
        true
    }

    /// Handle one raw inbound frame.
    ///
    /// Returns `None` once the connection is closed.
    pub async fn handle_message(&self, connection: &Arc<Connection>, raw: &str) -> Option<Outcome> {
        if connection.state() == ConnectionState::Closed {
            debug!(conn_id = %connection.id(), "ignoring message on closed connection");
            return None;
        }
        match Request::decode(raw) {
            Ok(request) => Some(self.dispatch(connection, request).await),
            Err(failure) => {
                warn!(conn_id = %connection.id(), error = %failure.error, "undecodable message");
                Some(Outcome::reply(Response::from_error(
                    failure.id,
                    &failure.error,
                    self.hub.error_style(),
                )))
            }
        }
    }

    /// Authorize and execute a decoded request.
    #[instrument(
        skip_all,
        fields(conn_id = %connection.id(), domain = self.domain.name(), command = %request.command_name())
    )]
    pub async fn dispatch(&self, connection: &Arc<Connection>, request: Request) -> Outcome {
        let style = self.hub.error_style();
        match self.domain.authorize(&request, connection) {
            AuthDecision::Allow => {}
            AuthDecision::Deny { code, message } => {
                debug!("access denied");
                let err = ChatterError::AuthDenied { code, message };
                return Outcome::reply(Response::from_error(request.id, &err, style));
            }
            AuthDecision::Override { response, success } => {
                return Outcome::reply(Response {
                    success,
                    response,
                    id: request.id,
                });
            }
        }

        let ctx = CommandContext {
            connection,
            id: &request.id,
            hub: &self.hub,
            domain: self.domain.as_ref(),
        };
        let timeout = self.hub.settings().dispatch.command_timeout();
        match self.hub.commands().execute(&request, &ctx, timeout).await {
            Ok(result) => Outcome::reply(Response::ok(request.id, result)),
            Err(err) => {
                log_failure(&err);
                Outcome {
                    close: err.closes_connection(),
                    response: Response::from_error(request.id, &err, style),
                }
            }
        }
    }

    /// Release everything the connection holds.
    ///
    /// Order: go offline, `on_disconnect`, release the identity (firing
    /// `on_user_offline` if it was still ours), purge subscriptions, forget
    /// the connection.
    pub async fn teardown(&self, connection: &Arc<Connection>) {
        connection.close();

        let timeout = self.hub.settings().dispatch.command_timeout();
        let hook = self.domain.on_disconnect(connection, &self.hub);
        match tokio::time::timeout(timeout, hook).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!(conn_id = %connection.id(), error = %e, "on_disconnect hook failed");
            }
            Err(_) => warn!(conn_id = %connection.id(), "on_disconnect hook timed out"),
        }

        let released = self.hub.release_identity(connection, self.domain.as_ref()).await;
        let purged = self.hub.router().remove_connection(connection);
        let untracked = self.hub.untrack(connection);

        info!(
            conn_id = %connection.id(),
            identity = ?connection.identity(),
            released,
            purged,
            dropped = connection.drop_count(),
            "client disconnected"
        );
        if untracked {
            counter!(WS_DISCONNECTIONS_TOTAL, "domain" => self.domain.name()).increment(1);
            gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);
            histogram!(WS_CONNECTION_DURATION_SECONDS).record(connection.age().as_secs_f64());
        }
    }
}

fn log_failure(err: &ChatterError) {
    match err.kind() {
        ErrorKind::HandlerFailure | ErrorKind::Timeout => error!(error = %err, "command failed"),
        ErrorKind::DuplicateIdentity => {
            warn!(error = %err, "duplicate identity, closing connection");
        }
        _ => debug!(error = %err, kind = err.kind().as_str(), "command rejected"),
    }
}
