//! termvisor-server - Background daemon owning the hypervisor

use anyhow::{anyhow, Result};
use clap::Parser;
use termvisor::config::Config;
use termvisor::hypervisor::{Hypervisor, PtySpawner};
use termvisor::rpc::RpcServer;
use tokio::sync::mpsc;

#[derive(Parser)]
#[command(name = "termvisor-server")]
#[command(about = "termvisor hypervisor daemon")]
struct Cli {
    /// Session name
    #[arg(short, long, default_value = "default")]
    session: String,

    /// Socket path override
    #[arg(long)]
    socket: Option<std::path::PathBuf>,

    /// Path to config file
    #[arg(short, long)]
    config: Option<std::path::PathBuf>,

    /// Command run by each new terminal (defaults to the configured shell)
    #[arg(long)]
    shell: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    tracing::info!("Starting termvisor server for session: {}", cli.session);

    let shell = cli
        .shell
        .unwrap_or_else(|| config.general.default_shell.clone());
    let defaults = config.terminal_defaults();
    let spawner = PtySpawner::new(shell, (defaults.columns, defaults.rows));

    let hypervisor = Hypervisor::new(&config, Box::new(spawner));
    let calls = hypervisor.call_sender();

    let (hv_shutdown_tx, hv_shutdown_rx) = mpsc::channel(1);
    let (rpc_shutdown_tx, rpc_shutdown_rx) = mpsc::channel(1);
    let hypervisor_task = tokio::spawn(hypervisor.run(hv_shutdown_rx));

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::info!("Interrupted"),
            Err(e) => tracing::error!("Failed to listen for Ctrl-C: {}", e),
        }
        let _ = rpc_shutdown_tx.send(()).await;
    });

    let socket_path = cli
        .socket
        .unwrap_or_else(|| config.socket_path(&cli.session));
    let server = RpcServer::new(socket_path, config.rpc.max_message_size);
    let served = server.run(calls, rpc_shutdown_rx).await;

    let _ = hv_shutdown_tx.send(()).await;
    hypervisor_task
        .await
        .map_err(|e| anyhow!("Hypervisor task failed: {}", e))?;

    served
}
