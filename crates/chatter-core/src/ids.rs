//! Connection id derivation.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Agent string used when the client sent no `User-Agent`.
const UNKNOWN_AGENT: &str = "Unknown";
/// Hex characters kept from the digest.
const ID_LEN: usize = 32;

/// Mixed into every derived id so identical handshakes never collide.
static DERIVE_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Identifier of one live connection.
///
/// Derived from handshake facts plus a per-process sequence number, so
/// two connections never share an id even when a client replays its
/// handshake. It is not a secret.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(String);

impl ConnectionId {
    /// Derive a fresh id from the peer address, user agent and websocket
    /// key. A missing key falls back to a random UUIDv7.
    ///
    /// Every call yields a distinct id within the process.
    pub fn derive(ip: &str, agent: Option<&str>, ws_key: Option<&str>) -> Self {
        let agent = agent.unwrap_or(UNKNOWN_AGENT);
        let key = ws_key
            .map(str::to_owned)
            .unwrap_or_else(|| uuid::Uuid::now_v7().to_string());

        let mut hasher = Sha256::new();
        hasher.update(ip.as_bytes());
        hasher.update(agent.as_bytes());
        hasher.update(key.as_bytes());
        hasher.update(DERIVE_SEQUENCE.fetch_add(1, Ordering::Relaxed).to_be_bytes());
        let mut hex = format!("{:x}", hasher.finalize());
        hex.truncate(ID_LEN);
        Self(hex)
    }

    /// Wrap an existing id string.
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Borrow as `&str`.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replayed_handshake_gets_fresh_id() {
        let a = ConnectionId::derive("10.0.0.1", Some("ua"), Some("samekey"));
        let b = ConnectionId::derive("10.0.0.1", Some("ua"), Some("samekey"));
        assert_ne!(a, b);
    }

    #[test]
    fn different_key_different_id() {
        let a = ConnectionId::derive("127.0.0.1", Some("curl"), Some("k1"));
        let b = ConnectionId::derive("127.0.0.1", Some("curl"), Some("k2"));
        assert_ne!(a, b);
    }

    #[test]
    fn missing_key_is_random() {
        let a = ConnectionId::derive("127.0.0.1", None, None);
        let b = ConnectionId::derive("127.0.0.1", None, None);
        assert_ne!(a, b);
    }

    #[test]
    fn id_is_fixed_length_hex() {
        let id = ConnectionId::derive("10.0.0.1", Some("Mozilla"), Some("abc=="));
        assert_eq!(id.as_str().len(), 32);
        assert!(id.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn many_derivations_are_all_distinct() {
        let ids: std::collections::HashSet<ConnectionId> = (0..1_000)
            .map(|_| ConnectionId::derive("1.1.1.1", None, Some("k")))
            .collect();
        assert_eq!(ids.len(), 1_000);
    }

    #[test]
    fn display_and_serde_are_plain_strings() {
        let id = ConnectionId::from_raw("c1");
        assert_eq!(id.to_string(), "c1");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"c1\"");
    }
}
