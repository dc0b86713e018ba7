//! # chatter-hub
//!
//! Connection hub binary: loads settings, installs logging and metrics, and
//! serves every built-in domain over websockets until Ctrl-C.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chatter_logging::LoggingConfig;
use chatter_server::{ChatterServer, Hub};
use chatter_settings::{ChatterSettings, LogFormat};
use clap::Parser;

/// Time allowed for open sessions to flush after Ctrl-C.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Chatter connection hub.
#[derive(Parser, Debug)]
#[command(name = "chatter-hub", about = "Real-time websocket connection hub")]
struct Cli {
    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides settings).
    #[arg(long)]
    port: Option<u16>,

    /// Settings file (defaults to `~/.chatter/settings.json`).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log format: json, pretty or compact (overrides settings).
    #[arg(long, value_parser = parse_log_format)]
    log_format: Option<LogFormat>,
}

fn parse_log_format(raw: &str) -> Result<LogFormat, String> {
    LogFormat::parse(raw).ok_or_else(|| format!("unknown log format '{raw}'"))
}

/// Defaults, then the settings file, then env, then CLI flags.
fn resolve_settings(cli: &Cli) -> Result<ChatterSettings> {
    let path = cli.config.clone().unwrap_or_else(chatter_settings::settings_path);
    let mut settings = chatter_settings::load_settings_from_path(&path)
        .with_context(|| format!("Failed to load settings from {}", path.display()))?;

    if let Some(host) = &cli.host {
        settings.server.host.clone_from(host);
    }
    if let Some(port) = cli.port {
        settings.server.port = port;
    }
    if let Some(format) = cli.log_format {
        settings.logging.format = format;
    }
    Ok(settings)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = resolve_settings(&cli)?;

    chatter_logging::init_logging(&LoggingConfig::from(&settings.logging))
        .context("Failed to initialize logging")?;
    let metrics = chatter_server::metrics::install_recorder()
        .context("Failed to install metrics recorder")?;

    let hub = Arc::new(Hub::with_builtin_domains(settings));
    let server = ChatterServer::new(hub.clone()).with_metrics(metrics);
    let (addr, handle) = server.listen().await.context("Failed to bind server")?;

    tracing::info!(
        domains = ?hub.domain_names(),
        commands = hub.commands().len(),
        "chatter hub listening on http://{addr}"
    );

    chatter_server::shutdown::ctrl_c().await;
    let report = server.shutdown().drain(&hub, handle, SHUTDOWN_GRACE).await;

    tracing::info!(lingering = report.lingering, "Shutdown complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_defaults_leave_settings_alone() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let cli = Cli::parse_from(["chatter-hub", "--config", path.to_str().unwrap()]);
        assert!(cli.host.is_none());
        let settings = resolve_settings(&cli).unwrap();
        assert_eq!(settings.cache.capacity, 200);
    }

    #[test]
    fn cli_flags_override_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"server": {"host": "10.0.0.1", "port": 9000}}"#).unwrap();
        let cli = Cli::parse_from([
            "chatter-hub",
            "--config",
            path.to_str().unwrap(),
            "--port",
            "7000",
            "--log-format",
            "pretty",
        ]);
        let settings = resolve_settings(&cli).unwrap();
        assert_eq!(settings.server.host, "10.0.0.1");
        assert_eq!(settings.server.port, 7000);
        assert_eq!(settings.logging.format, LogFormat::Pretty);
    }

    #[test]
    fn bad_log_format_is_rejected() {
        assert!(Cli::try_parse_from(["chatter-hub", "--log-format", "xml"]).is_err());
    }

    #[test]
    fn invalid_settings_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{nope").unwrap();
        let cli = Cli::parse_from(["chatter-hub", "--config", path.to_str().unwrap()]);
        assert!(resolve_settings(&cli).is_err());
    }
}
