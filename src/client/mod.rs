//! Client - typed wrappers over the hypervisor's RPC methods

mod input;

pub use input::tokenize;

use crate::config::Config;
use crate::dbus::ChannelInfo;
use crate::msg::{
    Message, MessageClear, MessagePutChar, MessageTokenizedCommand, ProcessId, TerminalId,
};
use crate::rpc::{
    deserialize, RpcClient, TermAndAttachedProcessId, GET_TERM_CHANNEL_INFO, LIST_PROCESS_IDS,
    LIST_TERMINAL_IDS, LIST_TIDS_WITH_PROCESS_IDS, START_TERMINAL_WITH_PROCESS,
};
use anyhow::{anyhow, Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// A connection to one hypervisor session
pub struct Session {
    rpc: RpcClient,
}

impl Session {
    /// Connect to the hypervisor serving `name`
    pub async fn connect(config: &Config, name: &str) -> Result<Self> {
        let socket_path = config.socket_path(name);
        if !socket_path.exists() {
            return Err(anyhow!("Session '{}' not found", name));
        }

        let rpc = RpcClient::connect(&socket_path, config.rpc_timeout())
            .await
            .with_context(|| format!("Failed to connect to {:?}", socket_path))?
            .with_max_message_size(config.rpc.max_message_size);
        Ok(Self { rpc })
    }

    pub fn from_client(rpc: RpcClient) -> Self {
        Self { rpc }
    }

    async fn call<T: DeserializeOwned>(&mut self, method: &str, args: &[String]) -> Result<T> {
        let bytes = self.rpc.send_to_rpc(method, args).await?;
        Ok(deserialize(&bytes)?)
    }

    pub async fn get_terminal_ids(&mut self) -> Result<Vec<TerminalId>> {
        self.call(LIST_TERMINAL_IDS, &[]).await
    }

    pub async fn get_term_ids_with_process_ids(&mut self) -> Result<Vec<TermAndAttachedProcessId>> {
        self.call(LIST_TIDS_WITH_PROCESS_IDS, &[]).await
    }

    pub async fn get_process_ids(&mut self) -> Result<Vec<ProcessId>> {
        self.call(LIST_PROCESS_IDS, &[]).await
    }

    pub async fn start_terminal_with_process(&mut self) -> Result<TerminalId> {
        self.call(START_TERMINAL_WITH_PROCESS, &[]).await
    }

    pub async fn get_term_channel_info(&mut self, id: TerminalId) -> Result<ChannelInfo> {
        self.call(GET_TERM_CHANNEL_INFO, &[id.to_string()]).await
    }

    /// Type `text` into a terminal one character at a time
    pub async fn put_text(&mut self, id: TerminalId, text: &str) -> Result<()> {
        for ch in text.chars() {
            self.rpc
                .send_input(Some(id), &Message::from(MessagePutChar { ch }))
                .await?;
        }
        Ok(())
    }

    /// Hand a command to the terminal's process
    pub async fn run_command(
        &mut self,
        id: TerminalId,
        command: MessageTokenizedCommand,
    ) -> Result<()> {
        self.rpc.send_input(Some(id), &Message::from(command)).await?;
        Ok(())
    }

    pub async fn clear(&mut self, id: TerminalId) -> Result<()> {
        self.rpc
            .send_input(Some(id), &Message::from(MessageClear))
            .await?;
        Ok(())
    }
}

/// Render a result as JSON or with `plain`
pub fn render<T: Serialize>(
    value: &T,
    json: bool,
    plain: impl FnOnce(&T) -> String,
) -> Result<String> {
    if json {
        Ok(serde_json::to_string_pretty(value)?)
    } else {
        Ok(plain(value))
    }
}

/// One id per line
pub fn render_ids<T: std::fmt::Display>(ids: &[T]) -> String {
    if ids.is_empty() {
        return "(none)".to_string();
    }
    ids.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn render_pairs(pairs: &[TermAndAttachedProcessId]) -> String {
    let mut out = vec![format!("{:<10} {}", "TERMINAL", "PROCESS")];
    for pair in pairs {
        let process = pair
            .attached_process_id
            .map(|p| p.to_string())
            .unwrap_or_else(|| "-".to_string());
        out.push(format!("{:<10} {}", pair.terminal_id, process));
    }
    out.join("\n")
}

pub fn render_channel_info(info: &ChannelInfo) -> String {
    let mut out = vec![
        format!("channel:   {}", info.channel_id),
        format!("publisher: {}", info.publisher),
    ];
    if info.subscribers.is_empty() {
        out.push("subscribers: (none)".to_string());
    } else {
        out.push("subscribers:".to_string());
        out.extend(info.subscribers.iter().map(|s| format!("  {}", s)));
    }
    out.join("\n")
}
