use anyhow::{Context, Result};
use capture_daemon::backend::HttpBackend;
use capture_daemon::daemon::{Daemon, DaemonSettings};
use capture_daemon::{pipeline, server};
use clap::Parser;
use log::{error, info};
use shared::Config;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};

/// Pending events before producers start waiting on the event loop.
const EVENT_BUFFER: usize = 64;

#[derive(Parser)]
#[command(name = "hand-capture-daemon")]
#[command(about = "Hand gesture capture daemon")]
struct Args {
    /// Configuration file (defaults to the user config directory)
    #[arg(short, long)]
    config: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to start the async runtime")?;
    runtime.block_on(run(config))
}

async fn run(config: Config) -> Result<()> {
    info!("Starting hand capture daemon");

    let backend = Arc::new(HttpBackend::new(&config.backend.base_url)?);
    info!("Using backend at {}", config.backend.base_url);

    let (events, inbox) = mpsc::channel(EVENT_BUFFER);
    let (detector, detector_options) = watch::channel(config.detector.options);

    let surface = pipeline::start(&config, detector_options, events.clone()).await;
    let listener = server::bind(&config.ipc.socket_path)?;

    let daemon = Daemon::new(
        DaemonSettings::from_config(&config),
        surface,
        backend,
        detector,
        events.clone(),
    );

    let server = tokio::spawn(server::serve(listener, events.clone()));

    let result = daemon
        .run_until(inbox, events, async {
            shutdown_signal().await;
            info!("Received Ctrl-C, shutting down");
        })
        .await;

    server.abort();
    if let Err(e) = std::fs::remove_file(&config.ipc.socket_path) {
        error!("Failed to remove socket {:?}: {}", config.ipc.socket_path, e);
    }
    result
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}
