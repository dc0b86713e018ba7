//! `/health` endpoint body.

use serde::Serialize;

use crate::hub::Hub;

/// Health check response body.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// Always `"ok"` while the server is running.
    pub status: String,
    /// Seconds since the hub was built.
    pub uptime_secs: u64,
    /// Live websocket connections.
    pub connections: usize,
    /// Registered identities.
    pub identities: usize,
    /// Served domains.
    pub domains: Vec<&'static str>,
}

/// Snapshot the hub's counters.
pub fn health_check(hub: &Hub) -> HealthResponse {
    HealthResponse {
        status: "ok".into(),
        uptime_secs: hub.uptime().as_secs(),
        connections: hub.connection_count(),
        identities: hub.registry().len(),
        domains: hub.domain_names(),
    }
}
