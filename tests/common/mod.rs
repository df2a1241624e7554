//! In-memory tasks shared by the integration tests

#![allow(dead_code)]

use anyhow::{anyhow, Result};
use bytes::Bytes;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use termvisor::dbus::SubscriberReceiver;
use termvisor::hypervisor::{ExtTask, TaskSpawner};
use termvisor::msg::{deserialize, MessageTokenizedCommand, TaskId};

/// Test-side view of a fake task
#[derive(Clone, Default)]
pub struct FakeHandle {
    pub exited: Arc<AtomicBool>,
    pub killed: Arc<AtomicBool>,
    pub received: Arc<Mutex<Vec<Bytes>>>,
    pub output: Arc<Mutex<VecDeque<Bytes>>>,
}

impl FakeHandle {
    pub fn exit(&self) {
        self.exited.store(true, Ordering::SeqCst);
    }

    pub fn was_killed(&self) -> bool {
        self.killed.load(Ordering::SeqCst)
    }

    pub fn emit(&self, data: &'static [u8]) {
        self.output
            .lock()
            .unwrap()
            .push_back(Bytes::from_static(data));
    }

    pub fn received(&self) -> Vec<Bytes> {
        self.received.lock().unwrap().clone()
    }
}

/// A task that echoes every command it is given as `ran: <line>`
pub struct FakeTask {
    id: TaskId,
    input: Option<SubscriberReceiver>,
    handle: FakeHandle,
}

impl FakeTask {
    pub fn new(id: TaskId) -> (Self, FakeHandle) {
        let handle = FakeHandle::default();
        (
            Self {
                id,
                input: None,
                handle: handle.clone(),
            },
            handle,
        )
    }
}

impl ExtTask for FakeTask {
    fn id(&self) -> TaskId {
        self.id
    }

    fn name(&self) -> &str {
        "fake"
    }

    fn has_exited(&mut self) -> bool {
        self.handle.exited.load(Ordering::SeqCst)
    }

    fn tick(&mut self) -> Result<()> {
        let Some(input) = self.input.as_mut() else {
            return Ok(());
        };

        while let Ok(message) = input.try_recv() {
            if let Ok(command) = deserialize::<MessageTokenizedCommand>(&message) {
                let echo = format!("ran: {}", command.to_line());
                self.handle
                    .output
                    .lock()
                    .unwrap()
                    .push_back(Bytes::from(echo));
            }
            self.handle.received.lock().unwrap().push(message);
        }
        Ok(())
    }

    fn try_recv_response(&mut self) -> Option<Bytes> {
        self.handle.output.lock().unwrap().pop_front()
    }

    fn kill(&mut self) -> Result<()> {
        self.handle.killed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Spawner handing out [`FakeTask`]s and keeping their handles
#[derive(Clone, Default)]
pub struct FakeSpawner {
    pub handles: Arc<Mutex<Vec<(TaskId, FakeHandle)>>>,
    pub fail: Arc<AtomicBool>,
}

impl FakeSpawner {
    pub fn handle(&self, id: TaskId) -> FakeHandle {
        self.handles
            .lock()
            .unwrap()
            .iter()
            .find(|(task, _)| *task == id)
            .map(|(_, handle)| handle.clone())
            .unwrap()
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

impl TaskSpawner for FakeSpawner {
    fn spawn(&self, id: TaskId, input: SubscriberReceiver) -> Result<Box<dyn ExtTask>> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(anyhow!("no such program"));
        }

        let (mut task, handle) = FakeTask::new(id);
        task.input = Some(input);
        self.handles.lock().unwrap().push((id, handle));
        Ok(Box::new(task))
    }
}
