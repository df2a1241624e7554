//! Terminal manager - the request/response facade over the hypervisor's registries

use super::{serialize, RpcError};
use crate::dbus::{ChannelBus, ChannelInfo, ResourceMeta, ResourceType};
use crate::hypervisor::{TaskRegistry, TaskSpawner};
use crate::msg::{ProcessId, TerminalId};
use crate::terminal::TerminalStack;
use serde::{Deserialize, Serialize};

pub const LIST_TERMINAL_IDS: &str = "ListTerminalIDs";
pub const LIST_TIDS_WITH_PROCESS_IDS: &str = "ListTIDsWithProcessIDs";
pub const LIST_PROCESS_IDS: &str = "ListProcessIDs";
pub const START_TERMINAL_WITH_PROCESS: &str = "StartTerminalWithProcess";
pub const GET_TERM_CHANNEL_INFO: &str = "GetTermChannelInfo";

/// A terminal and the process attached to it, if any
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermAndAttachedProcessId {
    pub terminal_id: TerminalId,
    pub attached_process_id: Option<ProcessId>,
}

/// Borrowed view over the registries for the duration of one call
///
/// Holding `&mut` to all three is what serializes RPC calls against any other
/// mutation of the terminal stack.
pub struct TerminalManager<'a> {
    tasks: &'a mut TaskRegistry,
    bus: &'a mut ChannelBus,
    terminals: &'a mut TerminalStack,
    spawner: &'a dyn TaskSpawner,
}

impl<'a> TerminalManager<'a> {
    pub fn new(
        tasks: &'a mut TaskRegistry,
        bus: &'a mut ChannelBus,
        terminals: &'a mut TerminalStack,
        spawner: &'a dyn TaskSpawner,
    ) -> Self {
        Self {
            tasks,
            bus,
            terminals,
            spawner,
        }
    }

    /// Run `method` and return its MessagePack-encoded result
    pub fn handle(&mut self, method: &str, args: &[String]) -> Result<Vec<u8>, RpcError> {
        tracing::debug!("RPC {}({:?})", method, args);

        match method {
            LIST_TERMINAL_IDS => serialize(&self.list_terminal_ids()),
            LIST_TIDS_WITH_PROCESS_IDS => serialize(&self.list_tids_with_process_ids()),
            LIST_PROCESS_IDS => serialize(&self.list_process_ids()),
            START_TERMINAL_WITH_PROCESS => serialize(&self.start_terminal_with_process()?),
            GET_TERM_CHANNEL_INFO => {
                let id = parse_terminal_id(method, args)?;
                serialize(&self.get_term_channel_info(id)?)
            }
            other => Err(RpcError::UnknownMethod(other.to_string())),
        }
    }

    pub fn list_terminal_ids(&self) -> Vec<TerminalId> {
        self.terminals.ids()
    }

    pub fn list_tids_with_process_ids(&self) -> Vec<TermAndAttachedProcessId> {
        self.terminals
            .iter()
            .map(|t| TermAndAttachedProcessId {
                terminal_id: t.id(),
                attached_process_id: t.attached_process(),
            })
            .collect()
    }

    pub fn list_process_ids(&self) -> Vec<ProcessId> {
        self.tasks.ids()
    }

    /// Create a terminal, give it an output channel and attach a new process
    ///
    /// The process subscribes to the terminal's output channel. If the spawn
    /// fails the terminal is dropped again and nothing is left registered.
    pub fn start_terminal_with_process(&mut self) -> Result<TerminalId, RpcError> {
        let terminal_id = self.terminals.add();
        let terminal_meta = ResourceMeta::new(terminal_id, ResourceType::Terminal);
        self.bus.register_resource(terminal_id, ResourceType::Terminal);
        let channel = self.bus.create_channel(terminal_meta);

        let process_id = self.tasks.allocate_id();
        let process_meta = ResourceMeta::new(process_id, ResourceType::Process);
        let input = self.bus.subscribe(channel, process_meta)?;

        let task = match self.spawner.spawn(process_id, input) {
            Ok(task) => task,
            Err(e) => {
                tracing::error!(
                    "Failed to start process for terminal {}: {:#}",
                    terminal_id,
                    e
                );
                self.bus.remove_channel(channel);
                self.bus.unregister_resource(terminal_id, ResourceType::Terminal);
                self.terminals.remove(terminal_id);
                return Err(RpcError::Spawn(format!("{:#}", e)));
            }
        };

        self.tasks.register(task);
        self.bus.register_resource(process_id, ResourceType::Process);

        let terminal = self.terminals.get_mut(terminal_id)?;
        terminal.set_out_channel(channel);
        terminal.attach_process(process_id);

        tracing::info!(
            "Started terminal {} with process {} on channel {}",
            terminal_id,
            process_id,
            channel
        );
        Ok(terminal_id)
    }

    pub fn get_term_channel_info(&self, id: TerminalId) -> Result<ChannelInfo, RpcError> {
        let channel = self
            .terminals
            .get(id)?
            .out_channel()
            .ok_or_else(|| RpcError::NotFound(format!("Terminal {} has no output channel", id)))?;
        Ok(self.bus.channel_info(channel)?)
    }
}

fn parse_terminal_id(method: &str, args: &[String]) -> Result<TerminalId, RpcError> {
    let raw = args.first().ok_or_else(|| RpcError::InvalidArgument {
        method: method.to_string(),
        reason: "expected a terminal id".to_string(),
    })?;

    raw.parse().map_err(|e| RpcError::InvalidArgument {
        method: method.to_string(),
        reason: format!("'{}' is not a terminal id: {}", raw, e),
    })
}
