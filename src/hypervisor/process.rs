//! PTY-backed worker processes

use super::task::{ExtTask, TaskSpawner};
use crate::dbus::SubscriberReceiver;
use crate::msg::{get_message_type, must_deserialize, MessageTokenizedCommand, MessageType, TaskId};
use anyhow::{Context, Result};
use bytes::Bytes;
use portable_pty::{native_pty_system, Child, ChildKiller, CommandBuilder, MasterPty, PtySize};
use std::io::{Read, Write};
use std::path::PathBuf;
use tokio::sync::mpsc;

const READ_CHUNK: usize = 4096;

/// A process running behind a pseudo-terminal
///
/// A reader thread moves PTY output into an unbounded queue so the hypervisor
/// can poll it without blocking. Input arrives as wire messages on the
/// subscription to the terminal's output channel.
pub struct PtyTask {
    id: TaskId,
    command: String,
    master: Box<dyn MasterPty + Send>,
    child: Box<dyn Child + Send + Sync>,
    writer: Box<dyn Write + Send>,
    output: mpsc::UnboundedReceiver<Bytes>,
    input: SubscriberReceiver,
    exit_code: Option<u32>,
}

impl PtyTask {
    /// Spawn `command` in a new PTY of `cols` x `rows`
    pub fn spawn(
        id: TaskId,
        command: &str,
        working_dir: Option<PathBuf>,
        (cols, rows): (u16, u16),
        input: SubscriberReceiver,
    ) -> Result<Self> {
        let pty_system = native_pty_system();
        let pair = pty_system
            .openpty(PtySize {
                rows,
                cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .context("Failed to open pty")?;

        let mut cmd = CommandBuilder::new(command);
        if let Some(dir) = working_dir {
            cmd.cwd(dir);
        }

        let child = pair
            .slave
            .spawn_command(cmd)
            .with_context(|| format!("Failed to spawn '{}'", command))?;
        drop(pair.slave);

        let reader = pair.master.try_clone_reader()?;
        let writer = pair.master.take_writer()?;
        let (tx, output) = mpsc::unbounded_channel();

        std::thread::Builder::new()
            .name(format!("pty-reader-{}", id))
            .spawn(move || read_loop(id, reader, tx))
            .context("Failed to start pty reader thread")?;

        tracing::info!(
            "Spawned task {} running '{}' (pid {:?})",
            id,
            command,
            child.process_id()
        );

        Ok(Self {
            id,
            command: command.to_string(),
            master: pair.master,
            child,
            writer,
            output,
            input,
            exit_code: None,
        })
    }

    /// OS process id, if the platform reports one
    pub fn pid(&self) -> Option<u32> {
        self.child.process_id()
    }

    pub fn exit_code(&self) -> Option<u32> {
        self.exit_code
    }

    pub fn resize(&self, cols: u16, rows: u16) -> Result<()> {
        self.master.resize(PtySize {
            rows,
            cols,
            pixel_width: 0,
            pixel_height: 0,
        })
    }

    fn forward(&mut self, message: &[u8]) -> Result<()> {
        if get_message_type(message) != MessageType::TokenizedCommand.tag() {
            tracing::warn!(
                "Task {} ignoring input of type {}",
                self.id,
                get_message_type(message)
            );
            return Ok(());
        }

        // Only the owning terminal publishes here, and it encodes what it sends
        let command: MessageTokenizedCommand = must_deserialize(message);
        self.writer.write_all(command.to_line().as_bytes())?;
        self.writer.flush()?;
        tracing::debug!("Task {} received command '{}'", self.id, command.command);
        Ok(())
    }
}

fn read_loop(id: TaskId, mut reader: Box<dyn Read + Send>, tx: mpsc::UnboundedSender<Bytes>) {
    let mut buf = [0u8; READ_CHUNK];
    loop {
        match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => {
                if tx.send(Bytes::copy_from_slice(&buf[..n])).is_err() {
                    break;
                }
            }
            Err(e) => {
                tracing::debug!("Task {} pty read ended: {}", id, e);
                break;
            }
        }
    }
    tracing::debug!("Task {} reader finished", id);
}

impl ExtTask for PtyTask {
    fn id(&self) -> TaskId {
        self.id
    }

    fn name(&self) -> &str {
        &self.command
    }

    fn has_exited(&mut self) -> bool {
        if self.exit_code.is_some() {
            return true;
        }
        match self.child.try_wait() {
            Ok(Some(status)) => {
                self.exit_code = Some(status.exit_code());
                true
            }
            Ok(None) => false,
            Err(e) => {
                tracing::warn!("Task {} wait failed: {}", self.id, e);
                false
            }
        }
    }

    fn tick(&mut self) -> Result<()> {
        while let Ok(message) = self.input.try_recv() {
            self.forward(&message)?;
        }
        Ok(())
    }

    fn try_recv_response(&mut self) -> Option<Bytes> {
        self.output.try_recv().ok()
    }

    fn kill(&mut self) -> Result<()> {
        self.child.kill()?;
        tracing::info!("Killed task {} ('{}')", self.id, self.command);
        Ok(())
    }
}

/// Spawns one PTY task per terminal, all running the same command
pub struct PtySpawner {
    command: String,
    working_dir: Option<PathBuf>,
    size: (u16, u16),
}

impl PtySpawner {
    pub fn new(command: impl Into<String>, size: (u16, u16)) -> Self {
        Self {
            command: command.into(),
            working_dir: None,
            size,
        }
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }
}

impl TaskSpawner for PtySpawner {
    fn spawn(&self, id: TaskId, input: SubscriberReceiver) -> Result<Box<dyn ExtTask>> {
        let task = PtyTask::spawn(
            id,
            &self.command,
            self.working_dir.clone(),
            self.size,
            input,
        )?;
        Ok(Box::new(task))
    }
}
