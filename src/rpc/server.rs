//! Unix socket RPC listener

use super::{
    deserialize, read_message, serialize, write_message, ClientFrame, RpcCall, RpcError,
    ServerFrame,
};
use anyhow::{anyhow, Result};
use std::path::{Path, PathBuf};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

/// Accepts client connections and forwards their requests to the hypervisor
pub struct RpcServer {
    socket_path: PathBuf,
    max_message_size: u32,
}

impl RpcServer {
    pub fn new(socket_path: PathBuf, max_message_size: u32) -> Self {
        Self {
            socket_path,
            max_message_size,
        }
    }

    /// Check if socket already exists (another server running)
    pub fn socket_exists(&self) -> bool {
        self.socket_path.exists()
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Serve until `shutdown_rx` fires
    pub async fn run(
        &self,
        calls: mpsc::Sender<RpcCall>,
        mut shutdown_rx: mpsc::Receiver<()>,
    ) -> Result<()> {
        if let Some(parent) = self.socket_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        if self.socket_path.exists() {
            // A live socket means another hypervisor owns this session
            match UnixStream::connect(&self.socket_path).await {
                Ok(_) => {
                    return Err(anyhow!(
                        "Hypervisor already listening on {:?}",
                        self.socket_path
                    ));
                }
                Err(_) => {
                    tracing::info!("Removing stale socket: {:?}", self.socket_path);
                    std::fs::remove_file(&self.socket_path)?;
                }
            }
        }

        let listener = UnixListener::bind(&self.socket_path)?;
        tracing::info!("RPC server listening on {:?}", self.socket_path);

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    tracing::info!("Shutdown signal received");
                    break;
                }

                accept_result = listener.accept() => {
                    match accept_result {
                        Ok((stream, _addr)) => {
                            let calls = calls.clone();
                            let max_message_size = self.max_message_size;
                            tokio::spawn(async move {
                                let result = handle_client(stream, calls, max_message_size).await;
                                if let Err(e) = result {
                                    tracing::error!("Client error: {}", e);
                                }
                            });
                        }
                        Err(e) => {
                            tracing::error!("Failed to accept connection: {}", e);
                        }
                    }
                }
            }
        }

        self.cleanup();
        Ok(())
    }

    fn cleanup(&self) {
        if self.socket_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.socket_path) {
                tracing::error!("Failed to remove socket file: {}", e);
            }
        }
    }
}

/// Serve one connection, one request at a time
async fn handle_client(
    stream: UnixStream,
    calls: mpsc::Sender<RpcCall>,
    max_message_size: u32,
) -> Result<(), RpcError> {
    let client_id = Uuid::new_v4();
    let (mut reader, mut writer) = stream.into_split();
    tracing::info!("Client connected: {}", client_id);

    loop {
        let bytes = match read_message(&mut reader, max_message_size).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                tracing::info!("Client disconnected: {}", client_id);
                break;
            }
            Err(e) => {
                tracing::error!("Error reading from client {}: {}", client_id, e);
                break;
            }
        };

        let response = match deserialize::<ClientFrame>(&bytes) {
            Ok(frame) => forward(frame, &calls).await,
            Err(e) => ServerFrame::Error(format!("Invalid request: {}", e)),
        };

        write_message(&mut writer, &serialize(&response)?).await?;
    }

    Ok(())
}

/// Queue a request for the hypervisor and wait for its answer
async fn forward(frame: ClientFrame, calls: &mpsc::Sender<RpcCall>) -> ServerFrame {
    match frame {
        ClientFrame::Call { method, args } => {
            let (reply, response) = oneshot::channel();
            if calls
                .send(RpcCall::Invoke {
                    method,
                    args,
                    reply,
                })
                .await
                .is_err()
            {
                return ServerFrame::Error(RpcError::Closed.to_string());
            }
            match response.await {
                Ok(Ok(bytes)) => ServerFrame::Result(bytes),
                Ok(Err(e)) => ServerFrame::Error(e.to_string()),
                Err(_) => ServerFrame::Error(RpcError::Closed.to_string()),
            }
        }
        ClientFrame::Input { terminal, bytes } => {
            let (reply, response) = oneshot::channel();
            if calls
                .send(RpcCall::Input {
                    terminal,
                    bytes,
                    reply,
                })
                .await
                .is_err()
            {
                return ServerFrame::Error(RpcError::Closed.to_string());
            }
            match response.await {
                Ok(Ok(())) => ServerFrame::Ack,
                Ok(Err(e)) => ServerFrame::Error(e.to_string()),
                Err(_) => ServerFrame::Error(RpcError::Closed.to_string()),
            }
        }
    }
}
