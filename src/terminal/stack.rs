//! The stack of live terminals

use super::{Terminal, TerminalDefaults, TerminalEffect, TerminalError};
use crate::msg::{MessageTokenizedCommand, ProcessId, TerminalId};
use std::collections::{BTreeMap, VecDeque};

/// A command a terminal has finished collecting
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalizedCommand {
    pub terminal: TerminalId,
    pub command: MessageTokenizedCommand,
}

/// Owns every terminal; ids are handed out from 1 upwards and never reused
pub struct TerminalStack {
    terms: BTreeMap<TerminalId, Terminal>,
    focused: Option<TerminalId>,
    last_id: u32,
    defaults: TerminalDefaults,
    finalized: VecDeque<FinalizedCommand>,
}

impl TerminalStack {
    pub fn new(defaults: TerminalDefaults) -> Self {
        Self {
            terms: BTreeMap::new(),
            focused: None,
            last_id: 0,
            defaults,
            finalized: VecDeque::new(),
        }
    }

    /// Create a terminal; the first one also takes focus
    pub fn add(&mut self) -> TerminalId {
        self.last_id += 1;
        let id = TerminalId(self.last_id);
        self.terms.insert(id, Terminal::new(id, &self.defaults));

        if self.focused.is_none() {
            self.focused = Some(id);
        }

        tracing::info!("Created terminal {}", id);
        id
    }

    /// Drop a terminal; focus moves to the lowest remaining id
    pub fn remove(&mut self, id: TerminalId) -> Option<Terminal> {
        let removed = self.terms.remove(&id)?;
        if self.focused == Some(id) {
            self.focused = self.terms.keys().next().copied();
        }
        self.finalized.retain(|c| c.terminal != id);
        tracing::info!("Removed terminal {}", id);
        Some(removed)
    }

    pub fn get(&self, id: TerminalId) -> Result<&Terminal, TerminalError> {
        self.terms.get(&id).ok_or(TerminalError::NotFound(id))
    }

    pub fn get_mut(&mut self, id: TerminalId) -> Result<&mut Terminal, TerminalError> {
        self.terms.get_mut(&id).ok_or(TerminalError::NotFound(id))
    }

    pub fn ids(&self) -> Vec<TerminalId> {
        self.terms.keys().copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Terminal> {
        self.terms.values()
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn focused(&self) -> Option<TerminalId> {
        self.focused
    }

    pub fn focus(&mut self, id: TerminalId) -> Result<(), TerminalError> {
        self.get(id)?;
        self.focused = Some(id);
        Ok(())
    }

    /// The terminal a process is attached to, if any
    pub fn terminal_for_process(&self, process: ProcessId) -> Option<TerminalId> {
        self.terms
            .values()
            .find(|t| t.attached_process() == Some(process))
            .map(Terminal::id)
    }

    /// Route a wire message to terminal `id`
    pub fn dispatch(&mut self, id: TerminalId, bytes: &[u8]) -> Result<(), TerminalError> {
        if let Some(TerminalEffect::Command(command)) = self.get_mut(id)?.unpack_message(bytes)? {
            self.on_user_command_final_stage(id, command);
        }
        Ok(())
    }

    /// Queue a finished command for execution by the terminal's process
    pub fn on_user_command_final_stage(
        &mut self,
        terminal: TerminalId,
        command: MessageTokenizedCommand,
    ) {
        tracing::info!(
            "Terminal {} finalized command '{}' with {} args",
            terminal,
            command.command,
            command.args.len()
        );
        self.finalized.push_back(FinalizedCommand { terminal, command });
    }

    pub fn take_finalized(&mut self) -> Vec<FinalizedCommand> {
        self.finalized.drain(..).collect()
    }
}

impl Default for TerminalStack {
    fn default() -> Self {
        Self::new(TerminalDefaults::default())
    }
}
