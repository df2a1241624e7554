//! Hypervisor - owns every registry and drives them from a single tick loop
//!
//! All mutable state lives in [`Hypervisor`]. Other tasks never touch it
//! directly: the RPC server queues [`RpcCall`]s and the tick loop answers them
//! between scheduler passes, so no locks are needed.

mod process;
mod task;

pub use process::{PtySpawner, PtyTask};
pub use task::{ExtTask, TaskError, TaskEvent, TaskRegistry, TaskSpawner};

use crate::config::Config;
use crate::dbus::{ChannelBus, ResourceMeta, ResourceType};
use crate::msg::{self, TerminalId};
use crate::rpc::{RpcCall, RpcError, TerminalManager};
use crate::terminal::{TerminalError, TerminalStack, TerminalState};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;

/// Requests that may wait for the tick loop before senders block
const CALL_QUEUE_DEPTH: usize = 64;

pub struct Hypervisor {
    tasks: TaskRegistry,
    bus: ChannelBus,
    terminals: TerminalStack,
    spawner: Box<dyn TaskSpawner>,
    calls_tx: mpsc::Sender<RpcCall>,
    calls_rx: mpsc::Receiver<RpcCall>,
    tick_interval: Duration,
}

impl Hypervisor {
    pub fn new(config: &Config, spawner: Box<dyn TaskSpawner>) -> Self {
        let (calls_tx, calls_rx) = mpsc::channel(CALL_QUEUE_DEPTH);
        Self {
            tasks: TaskRegistry::new(),
            bus: ChannelBus::new(),
            terminals: TerminalStack::new(config.terminal_defaults()),
            spawner,
            calls_tx,
            calls_rx,
            tick_interval: config.tick_interval(),
        }
    }

    /// Handle for queueing requests from other tasks
    pub fn call_sender(&self) -> mpsc::Sender<RpcCall> {
        self.calls_tx.clone()
    }

    pub fn tasks(&self) -> &TaskRegistry {
        &self.tasks
    }

    pub fn bus(&self) -> &ChannelBus {
        &self.bus
    }

    pub fn terminals(&self) -> &TerminalStack {
        &self.terminals
    }

    pub fn terminals_mut(&mut self) -> &mut TerminalStack {
        &mut self.terminals
    }

    pub fn terminal_manager(&mut self) -> TerminalManager<'_> {
        TerminalManager::new(
            &mut self.tasks,
            &mut self.bus,
            &mut self.terminals,
            self.spawner.as_ref(),
        )
    }

    /// One pass: at most one queued request, then commands, then tasks
    pub fn tick(&mut self) {
        if let Ok(call) = self.calls_rx.try_recv() {
            self.handle_call(call);
        }

        self.flush_finalized_commands();

        for event in self.tasks.tick() {
            self.on_task_event(event);
        }
    }

    pub fn handle_call(&mut self, call: RpcCall) {
        match call {
            RpcCall::Invoke {
                method,
                args,
                reply,
            } => {
                let result = self.terminal_manager().handle(&method, &args);
                if let Err(e) = &result {
                    tracing::warn!("RPC {} failed: {}", method, e);
                }
                if reply.send(result).is_err() {
                    tracing::debug!("Caller of {} went away before the reply", method);
                }
            }
            RpcCall::Input {
                terminal,
                bytes,
                reply,
            } => {
                let result = self.dispatch_input(terminal, &bytes);
                if reply.send(result).is_err() {
                    tracing::debug!("Caller went away before input was applied");
                }
            }
        }
    }

    /// Deliver a wire message to `terminal`, or to the focused terminal
    pub fn dispatch_input(
        &mut self,
        terminal: Option<TerminalId>,
        bytes: &[u8],
    ) -> Result<(), RpcError> {
        let id = terminal
            .or_else(|| self.terminals.focused())
            .ok_or_else(|| RpcError::NotFound("No terminal has focus".to_string()))?;
        self.terminals.dispatch(id, bytes)?;
        Ok(())
    }

    pub fn snapshot(&mut self, id: TerminalId) -> Result<TerminalState, TerminalError> {
        Ok(self.terminals.get_mut(id)?.snapshot())
    }

    /// Publish finalized commands on their terminal's output channel
    fn flush_finalized_commands(&mut self) {
        for finalized in self.terminals.take_finalized() {
            let channel = match self.terminals.get(finalized.terminal) {
                Ok(terminal) => terminal.out_channel(),
                Err(e) => {
                    tracing::warn!("Dropping command: {}", e);
                    continue;
                }
            };

            let Some(channel) = channel else {
                tracing::warn!(
                    "Terminal {} has no output channel, dropping '{}'",
                    finalized.terminal,
                    finalized.command.command
                );
                continue;
            };

            let publisher = ResourceMeta::new(finalized.terminal, ResourceType::Terminal);
            match self
                .bus
                .publish(channel, &publisher, msg::serialize(&finalized.command))
            {
                Ok(delivered) => tracing::debug!(
                    "Command from terminal {} delivered to {} subscriber(s)",
                    finalized.terminal,
                    delivered.len()
                ),
                Err(e) => tracing::warn!("Failed to publish command: {}", e),
            }
        }
    }

    fn on_task_event(&mut self, event: TaskEvent) {
        match event {
            TaskEvent::Output { task, data } => {
                match self.terminals.terminal_for_process(task) {
                    Some(id) => {
                        if let Ok(terminal) = self.terminals.get_mut(id) {
                            terminal.write_output(&data);
                        }
                    }
                    None => tracing::debug!(
                        "Discarding {} bytes from unattached task {}",
                        data.len(),
                        task
                    ),
                }
            }
            TaskEvent::Exited { task } => {
                if let Some(id) = self.terminals.terminal_for_process(task) {
                    if let Ok(terminal) = self.terminals.get_mut(id) {
                        terminal.detach_process();
                    }
                    tracing::info!("Process {} detached from terminal {}", task, id);
                }

                let meta = ResourceMeta::new(task, ResourceType::Process);
                self.bus.unsubscribe_everywhere(&meta);
                self.bus.unregister_resource(task, ResourceType::Process);
                self.tasks.remove(task);
            }
        }
    }

    /// Tick until `shutdown_rx` fires, then kill every task
    pub async fn run(mut self, mut shutdown_rx: mpsc::Receiver<()>) {
        let mut interval = tokio::time::interval(self.tick_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!("Hypervisor running, tick every {:?}", self.tick_interval);

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    tracing::info!("Hypervisor shutting down");
                    break;
                }
                _ = interval.tick() => self.tick(),
            }
        }

        self.tasks.teardown();
    }
}
