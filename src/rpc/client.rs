//! Client side of the RPC connection

use super::{
    deserialize, read_message, serialize, write_message, ClientFrame, RpcError, ServerFrame,
    MAX_MESSAGE_SIZE,
};
use crate::msg::{Message, TerminalId};
use std::path::Path;
use std::time::Duration;
use tokio::net::UnixStream;

/// One connection to a running hypervisor
///
/// Every request is bounded by `timeout`. Once a request has timed out its
/// response may still arrive later, so the connection refuses further use.
pub struct RpcClient {
    stream: UnixStream,
    timeout: Duration,
    max_message_size: u32,
    poisoned: bool,
}

impl RpcClient {
    pub async fn connect(path: impl AsRef<Path>, timeout: Duration) -> Result<Self, RpcError> {
        let stream = tokio::time::timeout(timeout, UnixStream::connect(path.as_ref()))
            .await
            .map_err(|_| RpcError::Timeout(timeout))??;

        tracing::debug!("Connected to {:?}", path.as_ref());
        Ok(Self {
            stream,
            timeout,
            max_message_size: MAX_MESSAGE_SIZE,
            poisoned: false,
        })
    }

    pub fn with_max_message_size(mut self, max_message_size: u32) -> Self {
        self.max_message_size = max_message_size;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Invoke `method` and return its MessagePack-encoded result
    pub async fn send_to_rpc(
        &mut self,
        method: &str,
        args: &[String],
    ) -> Result<Vec<u8>, RpcError> {
        let frame = ClientFrame::Call {
            method: method.to_string(),
            args: args.to_vec(),
        };

        match self.round_trip(&frame).await? {
            ServerFrame::Result(bytes) => Ok(bytes),
            ServerFrame::Error(e) => Err(RpcError::Remote(e)),
            ServerFrame::Ack => Err(RpcError::Codec(format!(
                "Unexpected acknowledgement for {}",
                method
            ))),
        }
    }

    /// Deliver a message to `terminal`, or to the focused terminal when `None`
    pub async fn send_input(
        &mut self,
        terminal: Option<TerminalId>,
        message: &Message,
    ) -> Result<(), RpcError> {
        let frame = ClientFrame::Input {
            terminal,
            bytes: message.encode(),
        };

        match self.round_trip(&frame).await? {
            ServerFrame::Ack => Ok(()),
            ServerFrame::Error(e) => Err(RpcError::Remote(e)),
            ServerFrame::Result(_) => Err(RpcError::Codec(
                "Unexpected result for terminal input".to_string(),
            )),
        }
    }

    async fn round_trip(&mut self, frame: &ClientFrame) -> Result<ServerFrame, RpcError> {
        if self.poisoned {
            return Err(RpcError::Closed);
        }

        let payload = serialize(frame)?;
        let timeout = self.timeout;
        let max_message_size = self.max_message_size;
        let stream = &mut self.stream;

        let exchange = async move {
            write_message(&mut *stream, &payload).await?;
            let reply = read_message(stream, max_message_size).await?;
            Ok::<_, RpcError>(reply)
        };

        let bytes = match tokio::time::timeout(timeout, exchange).await {
            Ok(result) => result?.ok_or(RpcError::Closed)?,
            Err(_) => {
                tracing::warn!("RPC request timed out after {:?}", timeout);
                self.poisoned = true;
                return Err(RpcError::Timeout(timeout));
            }
        };

        deserialize(&bytes)
    }
}
