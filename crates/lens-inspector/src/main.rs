//! # lens-inspector
//!
//! statelens inspector binary: loads settings, wires the session manager,
//! store registry, law engine, and gateway together, then serves until
//! ctrl-c.

#![deny(unsafe_code)]

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use lens_server::config::ServerConfig;
use lens_server::rpc::context::RpcContext;
use lens_server::rpc::handlers::register_all;
use lens_server::rpc::registry::MethodRegistry;
use lens_server::server::InspectorServer;
use lens_server::shutdown::DEFAULT_SHUTDOWN_TIMEOUT;
use lens_settings::LensSettings;
use metrics_exporter_prometheus::PrometheusHandle;

/// statelens inspector server.
#[derive(Parser, Debug)]
#[command(name = "lens-inspector", about = "Live state inspection server")]
struct Cli {
    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides settings).
    #[arg(long)]
    port: Option<u16>,

    /// Settings file (default `~/.statelens/settings.json`).
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Log level or filter directive (overrides settings).
    #[arg(long)]
    log_level: Option<String>,

    /// Emit JSON log lines.
    #[arg(long)]
    json_logs: bool,
}

impl Cli {
    /// Load settings and fold the command-line overrides in.
    fn resolve_settings(&self) -> Result<LensSettings> {
        let path = self
            .settings
            .clone()
            .unwrap_or_else(lens_settings::settings_path);
        let mut settings = lens_settings::load_settings_from_path(&path)
            .with_context(|| format!("Failed to load settings from {}", path.display()))?;

        if let Some(host) = &self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(level) = &self.log_level {
            settings.logging.level.clone_from(level);
        }
        if self.json_logs {
            settings.logging.json = true;
        }
        Ok(settings)
    }
}

/// Build the server from settings with every RPC method registered.
fn build_server(settings: LensSettings, metrics_handle: PrometheusHandle) -> Result<InspectorServer> {
    let config = ServerConfig::from(&settings.server);
    let ctx = RpcContext::from_settings(settings).context("Invalid law configuration")?;
    let mut registry = MethodRegistry::new();
    register_all(&mut registry);
    Ok(InspectorServer::new(config, registry, ctx, metrics_handle))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();
    let settings = args.resolve_settings()?;

    lens_core::logging::init_subscriber(&settings.logging.level, settings.logging.json);
    let metrics_handle =
        lens_server::metrics::install_recorder().context("Failed to install metrics recorder")?;

    let server = build_server(settings, metrics_handle)?;
    lens_server::tasks::spawn_all(&server);
    let method_count = server.registry().methods().len();

    let (addr, handle) = server
        .listen()
        .await
        .context("Failed to bind server")?;

    tracing::info!("statelens inspector listening on http://{addr} ({method_count} RPC methods registered)");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutting down...");
    server.shutdown().shutdown();
    server.hub().close_all().await;
    server
        .shutdown()
        .graceful_shutdown(Some(DEFAULT_SHUTDOWN_TIMEOUT))
        .await;
    if tokio::time::timeout(DEFAULT_SHUTDOWN_TIMEOUT, handle).await.is_err() {
        tracing::warn!("server did not stop within {:?}", DEFAULT_SHUTDOWN_TIMEOUT);
    }
    Ok(())
}
