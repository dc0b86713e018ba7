//! Identity registry: at most one live connection per identity.

use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use metrics::gauge;
use tracing::{debug, info};

use crate::connection::Connection;
use crate::metrics::IDENTITIES_REGISTERED;

/// Registry failures.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RegistryError {
    /// The identity already maps to a live connection.
    #[error("identity '{identity}' is already connected")]
    AlreadyConnected {
        /// The contested identity.
        identity: String,
    },
    /// The claiming connection closed before it could register.
    #[error("connection is closed")]
    ConnectionClosed,
}

/// Process-wide identity to connection map.
#[derive(Default)]
pub struct IdentityRegistry {
    entries: DashMap<String, Arc<Connection>>,
}

impl IdentityRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `identity` to `connection` and mark the connection authorized.
    ///
    /// Fails without touching the existing entry when the identity is held by
    /// a live connection. An entry left behind by a connection that already
    /// went offline is replaced.
    pub fn register(
        &self,
        identity: &str,
        connection: &Arc<Connection>,
    ) -> Result<(), RegistryError> {
        match self.entries.entry(identity.to_owned()) {
            Entry::Occupied(mut existing) => {
                if existing.get().is_online() {
                    return Err(RegistryError::AlreadyConnected {
                        identity: identity.to_owned(),
                    });
                }
                if !connection.authorize(identity) {
                    return Err(RegistryError::ConnectionClosed);
                }
                debug!(identity, stale = %existing.get().id(), "replacing offline registration");
                let _ = existing.insert(connection.clone());
            }
            Entry::Vacant(slot) => {
                if !connection.authorize(identity) {
                    return Err(RegistryError::ConnectionClosed);
                }
                let _ = slot.insert(connection.clone());
            }
        }
        info!(identity, conn_id = %connection.id(), "identity registered");
        self.update_gauge();
        Ok(())
    }

    /// Remove `identity` unconditionally. Absence is not an error.
    pub fn unregister(&self, identity: &str) -> Option<Arc<Connection>> {
        let removed = self.entries.remove(identity).map(|(_, conn)| conn);
        if removed.is_some() {
            self.update_gauge();
        }
        removed
    }

    /// Remove the connection's identity only if it still maps to this
    /// connection. Returns whether an entry was removed.
    pub fn unregister_connection(&self, connection: &Connection) -> bool {
        let Some(identity) = connection.identity() else {
            return false;
        };
        let removed = self
            .entries
            .remove_if(&identity, |_, held| held.is_same(connection))
            .is_some();
        if removed {
            info!(identity, conn_id = %connection.id(), "identity released");
            self.update_gauge();
        }
        removed
    }

    /// Connection registered under `identity`.
    pub fn lookup(&self, identity: &str) -> Option<Arc<Connection>> {
        self.entries.get(identity).map(|entry| entry.value().clone())
    }

    /// All registered identities, sorted.
    pub fn identities(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Number of registered identities.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nobody is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[allow(clippy::cast_precision_loss)]
    fn update_gauge(&self) {
        gauge!(IDENTITIES_REGISTERED).set(self.entries.len() as f64);
    }
}
