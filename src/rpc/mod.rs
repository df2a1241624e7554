//! RPC between the `termvisor` client and the hypervisor
//!
//! Frames are length-prefixed MessagePack. A client sends one [`ClientFrame`]
//! and waits for the matching [`ServerFrame`] before sending the next; the
//! server forwards each request to the hypervisor as an [`RpcCall`] and never
//! touches the registries itself.

mod client;
mod connection;
mod manager;
mod server;

pub use client::RpcClient;
pub use connection::{read_message, write_message};
pub use manager::{
    TermAndAttachedProcessId, TerminalManager, GET_TERM_CHANNEL_INFO, LIST_PROCESS_IDS,
    LIST_TERMINAL_IDS, LIST_TIDS_WITH_PROCESS_IDS, START_TERMINAL_WITH_PROCESS,
};
pub use server::RpcServer;

use crate::dbus::BusError;
use crate::hypervisor::TaskError;
use crate::msg::{MsgError, TerminalId};
use crate::terminal::TerminalError;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::oneshot;

/// Default cap on a single frame (10 MB)
pub const MAX_MESSAGE_SIZE: u32 = 10 * 1024 * 1024;

/// RPC errors, as seen by the caller
#[derive(Debug, Error)]
pub enum RpcError {
    #[error("Unknown method '{0}'")]
    UnknownMethod(String),

    #[error("Invalid argument for {method}: {reason}")]
    InvalidArgument { method: String, reason: String },

    #[error("{0}")]
    NotFound(String),

    #[error("Failed to start process: {0}")]
    Spawn(String),

    #[error("Rejected message: {0}")]
    Message(#[from] MsgError),

    #[error(transparent)]
    Bus(#[from] BusError),

    #[error("Codec error: {0}")]
    Codec(String),

    #[error("Transport error: {0}")]
    Transport(#[from] std::io::Error),

    #[error("Message too large: {size} bytes (max: {max})")]
    MessageTooLarge { size: u32, max: u32 },

    #[error("No response within {0:?}")]
    Timeout(Duration),

    #[error("Server error: {0}")]
    Remote(String),

    #[error("Hypervisor is not running")]
    Closed,
}

impl From<TaskError> for RpcError {
    fn from(e: TaskError) -> Self {
        RpcError::NotFound(e.to_string())
    }
}

impl From<TerminalError> for RpcError {
    fn from(e: TerminalError) -> Self {
        match e {
            TerminalError::NotFound(_) => RpcError::NotFound(e.to_string()),
            TerminalError::Message(inner) => RpcError::Message(inner),
        }
    }
}

/// Client to server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClientFrame {
    /// Invoke a named method with string arguments
    Call { method: String, args: Vec<String> },

    /// Deliver a wire message to a terminal, or the focused one
    Input {
        terminal: Option<TerminalId>,
        bytes: Vec<u8>,
    },
}

/// Server to client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServerFrame {
    /// MessagePack-encoded method result
    Result(Vec<u8>),
    Ack,
    Error(String),
}

/// A request queued for the hypervisor's tick loop
#[derive(Debug)]
pub enum RpcCall {
    Invoke {
        method: String,
        args: Vec<String>,
        reply: oneshot::Sender<Result<Vec<u8>, RpcError>>,
    },
    Input {
        terminal: Option<TerminalId>,
        bytes: Vec<u8>,
        reply: oneshot::Sender<Result<(), RpcError>>,
    },
}

/// Serialize a value to MessagePack bytes
pub fn serialize<T: Serialize>(value: &T) -> Result<Vec<u8>, RpcError> {
    rmp_serde::to_vec(value).map_err(|e| RpcError::Codec(format!("Failed to serialize: {}", e)))
}

/// Deserialize a value from MessagePack bytes
pub fn deserialize<'a, T: Deserialize<'a>>(bytes: &'a [u8]) -> Result<T, RpcError> {
    rmp_serde::from_slice(bytes)
        .map_err(|e| RpcError::Codec(format!("Failed to deserialize: {}", e)))
}

/// Frame a payload with its length for streaming
///
/// Frame format: [4-byte length BE][payload]
pub fn frame_message(payload: &[u8]) -> Vec<u8> {
    let len = payload.len() as u32;
    let mut framed = Vec::with_capacity(4 + payload.len());
    framed.extend_from_slice(&len.to_be_bytes());
    framed.extend_from_slice(payload);
    framed
}
