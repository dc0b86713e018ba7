//! Process-wide shared state handed to every connection task.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chatter_core::{ChatterError, ConnectionId, ErrorCodeStyle};
use chatter_settings::ChatterSettings;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::{debug, warn};

use crate::commands::CommandTable;
use crate::connection::Connection;
use crate::domains::{self, Domain};
use crate::events::EventRouter;
use crate::registry::{IdentityRegistry, RegistryError};

/// Registry, router, command table and live connections.
///
/// Built once at startup and shared by `Arc`. Tests build their own.
pub struct Hub {
    settings: ChatterSettings,
    registry: IdentityRegistry,
    router: EventRouter,
    commands: CommandTable,
    domains: BTreeMap<&'static str, Arc<dyn Domain>>,
    connections: DashMap<ConnectionId, Arc<Connection>>,
    started_at: Instant,
}

impl Hub {
    /// Build a hub serving `domains`.
    pub fn new(settings: ChatterSettings, domains: Vec<Arc<dyn Domain>>) -> Self {
        let commands = domains::build_table(&domains);
        let router = EventRouter::new(settings.cache.capacity);
        Self {
            settings,
            registry: IdentityRegistry::new(),
            router,
            commands,
            domains: domains.into_iter().map(|d| (d.name(), d)).collect(),
            connections: DashMap::new(),
            started_at: Instant::now(),
        }
    }

    /// Build a hub serving the built-in domains.
    pub fn with_builtin_domains(settings: ChatterSettings) -> Self {
        Self::new(settings, domains::builtin_domains())
    }

    /// Effective settings.
    pub fn settings(&self) -> &ChatterSettings {
        &self.settings
    }

    /// Identity registry.
    pub fn registry(&self) -> &IdentityRegistry {
        &self.registry
    }

    /// Event router.
    pub fn router(&self) -> &EventRouter {
        &self.router
    }

    /// Command table.
    pub fn commands(&self) -> &CommandTable {
        &self.commands
    }

    /// Wire error code style.
    pub fn error_style(&self) -> ErrorCodeStyle {
        self.settings.dispatch.error_codes
    }

    /// Domain by name.
    pub fn domain(&self, name: &str) -> Option<Arc<dyn Domain>> {
        self.domains.get(name).cloned()
    }

    /// Served domain names, sorted.
    pub fn domain_names(&self) -> Vec<&'static str> {
        self.domains.keys().copied().collect()
    }

    /// Add a connection to the live set.
    ///
    /// Returns `false` and leaves the set unchanged when another live
    /// connection already holds the same id.
    pub fn track(&self, connection: &Arc<Connection>) -> bool {
        match self.connections.entry(connection.id().clone()) {
            Entry::Occupied(held) if !held.get().is_same(connection) => {
                warn!(conn_id = %connection.id(), "connection id already in use, refusing");
                false
            }
            Entry::Occupied(_) => true,
            Entry::Vacant(slot) => {
                let _ = slot.insert(connection.clone());
                true
            }
        }
    }

    /// Drop a connection from the live set. A different connection
    /// tracked under the same id is left alone.
    pub fn untrack(&self, connection: &Connection) -> bool {
        self.connections
            .remove_if(connection.id(), |_, held| held.is_same(connection))
            .is_some()
    }

    /// Live connection by id.
    pub fn connection(&self, id: &ConnectionId) -> Option<Arc<Connection>> {
        self.connections.get(id).map(|c| c.value().clone())
    }

    /// Number of live connections.
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Snapshot of live connections.
    pub fn live_connections(&self) -> Vec<Arc<Connection>> {
        self.connections.iter().map(|c| c.value().clone()).collect()
    }

    /// Time since the hub was built.
    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Register `identity` for `connection` and fire the domain's
    /// `on_user_online` hook.
    ///
    /// Claiming the identity the connection already holds is a no-op. A
    /// connection cannot switch to a different identity.
    pub async fn claim_identity(
        &self,
        connection: &Arc<Connection>,
        identity: &str,
        domain: &dyn Domain,
    ) -> Result<(), ChatterError> {
        if let Some(current) = connection.identity() {
            if current == identity {
                return Ok(());
            }
            return Err(ChatterError::handler(format!(
                "connection already authorized as '{current}'"
            )));
        }

        self.registry
            .register(identity, connection)
            .map_err(|e| match e {
                RegistryError::AlreadyConnected { identity } => {
                    ChatterError::DuplicateIdentity { identity }
                }
                RegistryError::ConnectionClosed => {
                    ChatterError::handler("connection closed before registration")
                }
            })?;

        if let Err(e) = domain.on_user_online(connection, identity, self).await {
            warn!(conn_id = %connection.id(), identity, error = %e, "on_user_online hook failed");
        }
        Ok(())
    }

    /// Release the connection's identity if the registry still maps it to
    /// this connection, then fire `on_user_offline`. Returns whether an
    /// entry was removed.
    pub async fn release_identity(
        &self,
        connection: &Arc<Connection>,
        domain: &dyn Domain,
    ) -> bool {
        let Some(identity) = connection.identity() else {
            return false;
        };
        if !self.registry.unregister_connection(connection) {
            debug!(conn_id = %connection.id(), identity, "identity held elsewhere, not released");
            return false;
        }
        if let Err(e) = domain.on_user_offline(connection, &identity, self).await {
            warn!(conn_id = %connection.id(), identity, error = %e, "on_user_offline hook failed");
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{make_connection, make_hub};
    use assert_matches::assert_matches;

    #[test]
    fn serves_builtin_domains() {
        let hub = make_hub();
        assert_eq!(hub.domain_names(), vec!["chat", "example1", "example2"]);
        assert!(hub.domain("chat").is_some());
        assert!(hub.domain("nope").is_none());
    }

    #[test]
    fn track_and_untrack() {
        let hub = make_hub();
        let (conn, _rx) = make_connection("c1", "chat");
        assert!(hub.track(&conn));
        assert!(hub.track(&conn));
        assert_eq!(hub.connection_count(), 1);
        assert!(hub.connection(conn.id()).is_some());
        assert!(hub.untrack(&conn));
        assert!(!hub.untrack(&conn));
        assert_eq!(hub.connection_count(), 0);
    }

    #[test]
    fn reused_id_is_refused_and_holder_kept() {
        let hub = make_hub();
        let (holder, _rx1) = make_connection("same", "chat");
        let (twin, _rx2) = make_connection("same", "chat");
        assert!(hub.track(&holder));
        assert!(!hub.track(&twin));
        assert!(!hub.untrack(&twin));
        assert!(hub.connection(holder.id()).unwrap().is_same(&holder));
    }

    #[tokio::test]
    async fn claim_registers_and_authorizes() {
        let hub = make_hub();
        let domain = hub.domain("chat").unwrap();
        let (conn, _rx) = make_connection("c1", "chat");
        hub.claim_identity(&conn, "alice", domain.as_ref()).await.unwrap();
        assert!(conn.is_authorized());
        assert_eq!(hub.registry().lookup("alice").unwrap().id(), conn.id());
    }

    #[tokio::test]
    async fn duplicate_claim_is_rejected() {
        let hub = make_hub();
        let domain = hub.domain("chat").unwrap();
        let (first, _rx1) = make_connection("c1", "chat");
        let (second, _rx2) = make_connection("c2", "chat");
        hub.claim_identity(&first, "alice", domain.as_ref()).await.unwrap();
        let err = hub
            .claim_identity(&second, "alice", domain.as_ref())
            .await
            .unwrap_err();
        assert_matches!(err, ChatterError::DuplicateIdentity { ref identity } if identity == "alice");
        assert_eq!(hub.registry().lookup("alice").unwrap().id(), first.id());
    }

    #[tokio::test]
    async fn reclaiming_same_identity_is_noop_but_switching_fails() {
        let hub = make_hub();
        let domain = hub.domain("chat").unwrap();
        let (conn, _rx) = make_connection("c1", "chat");
        hub.claim_identity(&conn, "alice", domain.as_ref()).await.unwrap();
        hub.claim_identity(&conn, "alice", domain.as_ref()).await.unwrap();
        let err = hub.claim_identity(&conn, "bob", domain.as_ref()).await.unwrap_err();
        assert_matches!(err, ChatterError::HandlerFailure { .. });
        assert!(hub.registry().lookup("bob").is_none());
    }

    #[tokio::test]
    async fn release_only_own_registration() {
        let hub = make_hub();
        let domain = hub.domain("chat").unwrap();
        let (conn, _rx) = make_connection("c1", "chat");
        assert!(!hub.release_identity(&conn, domain.as_ref()).await);
        hub.claim_identity(&conn, "alice", domain.as_ref()).await.unwrap();
        assert!(hub.release_identity(&conn, domain.as_ref()).await);
        assert!(hub.registry().is_empty());
    }
}
