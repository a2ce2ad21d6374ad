//! Load-balancing reverse proxy.
//!
//! # Architecture Overview
//!
//! ```text
//!                        ┌──────────────────────────────────────────────┐
//!                        │                 LB PROXY                     │
//!    Client Request      │  ┌─────────┐    ┌──────────────┐             │
//!    ────────────────────┼─▶│  http   │───▶│   routing    │             │
//!                        │  │ server  │    │   pipeline   │             │
//!                        │  └─────────┘    └──────┬───────┘             │
//!                        │                        │ next_backend()      │
//!                        │                        ▼                     │
//!                        │                 ┌──────────────┐             │
//!                        │                 │load_balancer │◀──┐         │
//!                        │                 │   + pool     │   │ alive   │
//!                        │                 └──────┬───────┘   │         │
//!                        │                        │      ┌────┴─────┐   │
//!    Client Response     │  ┌─────────┐           ▼      │  health  │   │
//!    ◀───────────────────┼──│ forward │◀── connection ── │ monitor  │   │
//!                        │  └────┬────┘    guard         └──────────┘   │
//!                        └───────┼──────────────────────────────────────┘
//!                                ▼
//!                             Backend
//! ```

use std::path::PathBuf;

use clap::Parser;

use lb_proxy::config::loader::load_config;
use lb_proxy::lifecycle::startup;
use lb_proxy::observability::logging;

#[derive(Parser)]
#[command(name = "lb-proxy")]
#[command(about = "Load-balancing HTTP reverse proxy", long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Validate the configuration and exit.
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = load_config(&cli.config)?;

    if cli.check {
        println!("Configuration OK: {}", cli.config.display());
        return Ok(());
    }

    logging::init_logging(&config.observability);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %cli.config.display(),
        "lb-proxy starting"
    );

    tracing::info!(
        bind_address = %config.listener.bind_address,
        backends = config.backends.len(),
        algorithm = %config.load_balancer.algorithm,
        health_checks = config.health_check.enabled,
        "Configuration loaded"
    );

    startup::run(config).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
