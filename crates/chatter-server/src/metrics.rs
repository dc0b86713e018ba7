//! Prometheus metrics recorder and metric names.

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Install the Prometheus recorder as the global `metrics` recorder.
///
/// Returns the handle used to render `/metrics`. Call once at startup.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

// Metric names shared across modules.

/// Commands executed (counter, labels: domain, command).
pub const COMMANDS_TOTAL: &str = "commands_total";
/// Failed commands (counter, labels: domain, command, error_kind).
pub const COMMAND_ERRORS_TOTAL: &str = "command_errors_total";
/// Command execution time (histogram, labels: domain, command).
pub const COMMAND_DURATION_SECONDS: &str = "command_duration_seconds";
/// Websocket connections opened (counter, labels: domain).
pub const WS_CONNECTIONS_TOTAL: &str = "ws_connections_total";
/// Websocket connections closed (counter, labels: domain).
pub const WS_DISCONNECTIONS_TOTAL: &str = "ws_disconnections_total";
/// Live websocket connections (gauge).
pub const WS_CONNECTIONS_ACTIVE: &str = "ws_connections_active";
/// Websocket connection lifetime (histogram).
pub const WS_CONNECTION_DURATION_SECONDS: &str = "ws_connection_duration_seconds";
/// Event frames queued for delivery (counter).
pub const EVENTS_DELIVERED_TOTAL: &str = "events_delivered_total";
/// Event frames that could not be queued (counter).
pub const EVENTS_DROPPED_TOTAL: &str = "events_dropped_total";
/// Registered identities (gauge).
pub const IDENTITIES_REGISTERED: &str = "identities_registered";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_from_local_recorder() {
        // Build without global install to avoid cross-test conflicts.
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        metrics::with_local_recorder(&recorder, || {
            metrics::counter!(COMMANDS_TOTAL, "domain" => "chat", "command" => "user.auth")
                .increment(1);
        });
        let output = handle.render();
        assert!(output.contains(COMMANDS_TOTAL));
        assert!(output.contains("user.auth"));
    }

    #[test]
    fn metric_names_are_snake_case() {
        let names = [
            COMMANDS_TOTAL,
            COMMAND_ERRORS_TOTAL,
            COMMAND_DURATION_SECONDS,
            WS_CONNECTIONS_TOTAL,
            WS_DISCONNECTIONS_TOTAL,
            WS_CONNECTIONS_ACTIVE,
            WS_CONNECTION_DURATION_SECONDS,
            EVENTS_DELIVERED_TOTAL,
            EVENTS_DROPPED_TOTAL,
            IDENTITIES_REGISTERED,
        ];
        for name in names {
            assert!(
                name.chars().all(|c| c.is_ascii_lowercase() || c == '_'),
                "{name} is not snake_case"
            );
        }
    }
}
