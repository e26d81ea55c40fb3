use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use stopguard_server::StopServer;
use stopguard_settings::{default_settings_path, load_settings_from_path};
use stopguard_telemetry::{init_telemetry, TelemetryConfig};

/// Bus-stop emergency broker.
#[derive(Debug, Parser)]
#[command(name = "stopguard", version)]
struct Cli {
    /// Settings file (JSON). Defaults to ./stopguard.json when present.
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Listen port, overriding settings and environment.
    #[arg(long, short)]
    port: Option<u16>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let path = cli.config.clone().unwrap_or_else(default_settings_path);
    let loaded = load_settings_from_path(&path)
        .with_context(|| format!("loading settings from {}", path.display()))?;
    let mut settings = loaded.settings;
    if let Some(port) = cli.port {
        settings.server.port = port;
    }
    if let Some(level) = cli.log_level {
        settings.logging.level = level;
    }

    let telemetry = init_telemetry(TelemetryConfig::from_level_name(
        &settings.logging.level,
        settings.logging.json,
        settings.logging.metrics_enabled,
    ));

    if loaded.from_file {
        tracing::info!(path = %path.display(), "settings file loaded");
    } else {
        tracing::info!(path = %path.display(), "no settings file, using defaults");
    }
    for rejected in &loaded.rejected_env {
        tracing::warn!(
            key = rejected.key,
            value = %rejected.value,
            expected = rejected.expected,
            "ignoring invalid environment override"
        );
    }

    let server = StopServer::from_settings(settings)
        .context("building collector and call-control clients")?
        .with_metrics(telemetry.metrics_handle());
    let (addr, handle) = server
        .listen()
        .await
        .with_context(|| format!("binding {}", server.settings().server.bind_addr()))?;
    tracing::info!(%addr, "stopguard ready");

    tokio::signal::ctrl_c()
        .await
        .context("listening for ctrl+c")?;

    tracing::info!("shutting down");
    let outcome = server.shutdown().graceful_shutdown(handle, None).await;
    tracing::info!(?outcome, "stopped");
    Ok(())
}
