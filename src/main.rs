//! Zeta kernel server - main entry point.
//!
//! Builds a kernel with the queue and dispatch managers over the in-process
//! transport and serves the HTTP control surface until Ctrl-C.

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;

use zeta_kernel::control::{ControlServer, ControlState};
use zeta_kernel::kernel::KernelBuilder;
use zeta_kernel::transport::{MemoryTransport, PartitionRouter};
use zeta_kernel::Config;

#[derive(Debug, Parser)]
#[command(name = "zeta-kernel")]
#[command(about = "Lightweight service kernel with an HTTP control surface")]
struct Cli {
    /// JSON configuration file; defaults apply to anything it omits.
    #[arg(long, env = "ZETA_CONFIG")]
    config: Option<PathBuf>,

    /// Control surface address, overrides `server.listen_addr`.
    #[arg(long, env = "ZETA_LISTEN")]
    listen: Option<String>,

    /// Log filter used when RUST_LOG is unset, overrides `observability.log_level`.
    #[arg(long, env = "ZETA_LOG_LEVEL")]
    log_level: Option<String>,

    /// Start every manager before serving.
    #[arg(long)]
    autostart: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    if let Some(listen) = cli.listen {
        config.server.listen_addr = listen;
    }
    if let Some(level) = cli.log_level {
        config.observability.log_level = level;
    }

    zeta_kernel::observability::init_tracing(&config.observability);

    let router = PartitionRouter::from_config(&config.transport)?;
    let transport = Arc::new(MemoryTransport::new(router));
    let (builder, core) = KernelBuilder::with_core_managers(&config, transport)?;
    let kernel = builder.build();

    if cli.autostart {
        if let Err(e) = kernel.start().await {
            tracing::error!(error = %e, "autostart failed, kernel is degraded");
        }
    }

    let server = ControlServer::new(ControlState {
        kernel: kernel.clone(),
        dispatcher: core.dispatcher,
    });
    let shutdown = server.shutdown_token();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
        }
        tracing::info!("shutdown requested");
        shutdown.cancel();
    });

    tracing::info!(
        kernel = %kernel.name(),
        services = ?kernel.service_names(),
        addr = %config.server.listen_addr,
        "zeta kernel starting"
    );
    server.serve(&config.server.listen_addr).await?;

    if let Err(e) = kernel.close().await {
        tracing::error!(error = %e, "kernel close reported failures");
    }
    Ok(())
}
