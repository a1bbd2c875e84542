use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use relay_platform::NullConnector;
use relay_server::ServerConfig;
use relay_telemetry::{LogFormat, TelemetryConfig};

/// Relay OTP messages from a Telegram account to the browser that asked for them.
#[derive(Debug, Parser)]
#[command(name = "otp-relay", version)]
struct Cli {
    /// Address to bind (overrides HOST).
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on (overrides PORT).
    #[arg(long)]
    port: Option<u16>,

    /// Log output format.
    #[arg(long, env = "RELAY_LOG_FORMAT", default_value = "json")]
    log_format: LogFormat,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    relay_telemetry::init_telemetry(&TelemetryConfig {
        format: cli.log_format,
        ..Default::default()
    })
    .context("failed to initialize logging")?;

    let mut config = ServerConfig::from_env();
    if let Some(host) = cli.host {
        config.host = host;
    }
    if let Some(port) = cli.port {
        config.port = port;
    }

    tracing::info!(bind = %config.bind_addr(), "Starting OTP relay");

    let handle = relay_server::start(config, Arc::new(NullConnector))
        .await
        .context("failed to start server")?;

    tracing::info!(port = handle.port, platform = handle.sessions().platform(), "OTP relay ready");
    tracing::warn!("No Telegram backend is configured; submitted sessions will not relay OTPs");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl+c")?;

    tracing::info!("Shutting down");
    let report = handle.shutdown().await;
    tracing::info!(sessions_closed = report.sessions_closed, tasks_aborted = report.tasks_aborted, "Stopped");
    Ok(())
}
