//! # huddle-agent
//!
//! Hub server binary: loads settings, installs logging and metrics, then
//! serves rooms until interrupted.

#![deny(unsafe_code)]

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use huddle_core::init_subscriber;
use huddle_server::{HuddleServer, ServerConfig};
use huddle_settings::HuddleSettings;

/// Real-time room broadcast hub.
#[derive(Parser, Debug)]
#[command(name = "huddle-agent", about = "Real-time room broadcast hub", version)]
struct Cli {
    /// Settings file (defaults to `~/.huddle/settings.json`).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides settings).
    #[arg(long)]
    port: Option<u16>,

    /// Log filter directive, e.g. `debug` or `huddle_hub=trace` (overrides settings).
    #[arg(long)]
    log_level: Option<String>,
}

impl Cli {
    /// Load settings from the chosen file and apply CLI overrides on top.
    fn resolve_settings(&self) -> Result<HuddleSettings> {
        let path = self.config.clone().unwrap_or_else(huddle_settings::settings_path);
        let mut settings = huddle_settings::load_settings_from_path(&path)
            .with_context(|| format!("Failed to load settings from {}", path.display()))?;
        self.apply_overrides(&mut settings);
        settings.validate().context("Invalid settings after CLI overrides")?;
        Ok(settings)
    }

    fn apply_overrides(&self, settings: &mut HuddleSettings) {
        if let Some(ref host) = self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(ref level) = self.log_level {
            settings.logging.level.clone_from(level);
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();
    let settings = args.resolve_settings()?;

    init_subscriber(&settings.logging.level, settings.logging.format);
    let metrics = huddle_server::metrics::install_recorder()
        .context("Failed to install metrics recorder")?;

    let config = ServerConfig::from(&settings.server);
    let server = HuddleServer::new(config, metrics);
    let (addr, handle) = server.listen().await.context("Failed to bind server")?;

    tracing::info!(
        service = huddle_core::constants::NAME,
        version = huddle_core::constants::VERSION,
        "listening on http://{addr}"
    );

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutting down...");
    let report = server.shutdown_gracefully(vec![handle]).await;
    if !report.is_clean() {
        tracing::warn!(
            sessions_remaining = report.sessions_remaining,
            tasks_aborted = report.tasks_aborted,
            "shutdown deadline passed before everything stopped"
        );
    }
    Ok(())
}
