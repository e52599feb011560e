//! Operator IPC: a Unix socket speaking the length-prefixed protocol from `shared::ipc`.

use anyhow::{Context, Result};
use log::{debug, info, warn};
use shared::ipc::{protocol, ClientMessage, DaemonMessage};
use std::path::Path;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{mpsc, oneshot};

use crate::event::Event;

/// Binds the daemon socket, replacing a stale one left by an earlier run.
pub fn bind(path: &Path) -> Result<UnixListener> {
    if path.exists() {
        std::fs::remove_file(path)
            .with_context(|| format!("Failed to remove stale socket {:?}", path))?;
    }
    let listener =
        UnixListener::bind(path).with_context(|| format!("Failed to bind {:?}", path))?;
    info!("Listening on {:?}", path);
    Ok(listener)
}

/// Accepts clients until the event loop goes away.
pub async fn serve(listener: UnixListener, events: mpsc::Sender<Event>) -> Result<()> {
    loop {
        let (stream, _) = listener.accept().await?;
        if events.is_closed() {
            return Ok(());
        }
        let events = events.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_client(stream, events).await {
                warn!("Client connection failed: {:#}", e);
            }
        });
    }
}

/// Answers requests on one connection, in order, until the client hangs up.
async fn handle_client(mut stream: UnixStream, events: mpsc::Sender<Event>) -> Result<()> {
    debug!("Client connected");
    loop {
        let message: ClientMessage = match protocol::receive_message(&mut stream).await {
            Ok(message) => message,
            Err(e) => {
                // A clean hang-up surfaces as an EOF while reading the length prefix.
                let eof = e
                    .downcast_ref::<std::io::Error>()
                    .map(|io| io.kind() == std::io::ErrorKind::UnexpectedEof)
                    .unwrap_or(false);
                if eof {
                    debug!("Client disconnected");
                    return Ok(());
                }
                return Err(e);
            }
        };

        let shutting_down = matches!(message, ClientMessage::Shutdown);
        let (reply, response) = oneshot::channel();
        events
            .send(Event::Command { message, reply })
            .await
            .context("Daemon is shutting down")?;
        let response = response.await.unwrap_or_else(|_| DaemonMessage::ShuttingDown);
        protocol::send_message(&mut stream, &response).await?;

        if shutting_down {
            return Ok(());
        }
    }
}
