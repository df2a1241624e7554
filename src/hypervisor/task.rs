//! External task registry
//!
//! Tracks handles to worker processes by [`TaskId`]. The registry is drained
//! once per scheduler pass through [`TaskRegistry::tick`], which only ever
//! polls: a task with nothing to say costs one failed `try_recv`.

use crate::dbus::SubscriberReceiver;
use crate::msg::TaskId;
use anyhow::Result;
use bytes::Bytes;
use std::collections::{BTreeMap, HashSet};
use thiserror::Error;

/// Handle to a running external worker
pub trait ExtTask: Send {
    fn id(&self) -> TaskId;

    /// Human-readable label, usually the command line
    fn name(&self) -> &str;

    /// Exit signal: true once the underlying process has terminated
    fn has_exited(&mut self) -> bool;

    /// Per-pass hook, called before responses are drained
    fn tick(&mut self) -> Result<()>;

    /// Non-blocking read of the response channel
    fn try_recv_response(&mut self) -> Option<Bytes>;

    fn kill(&mut self) -> Result<()>;
}

/// Creates tasks for freshly started terminals
pub trait TaskSpawner: Send {
    /// `input` is the task's subscription to its terminal's output channel
    fn spawn(&self, id: TaskId, input: SubscriberReceiver) -> Result<Box<dyn ExtTask>>;
}

/// Task registry errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaskError {
    #[error("External task with id {0} doesn't exist")]
    NotFound(TaskId),
}

/// Something a task produced during a tick
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskEvent {
    Output { task: TaskId, data: Bytes },
    /// Reported once per task, on the first tick that sees it exited
    Exited { task: TaskId },
}

#[derive(Default)]
pub struct TaskRegistry {
    tasks: BTreeMap<TaskId, Box<dyn ExtTask>>,
    reported_exits: HashSet<TaskId>,
    last_id: u32,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a task under its own id
    ///
    /// Registering an id that is already present keeps the existing task and
    /// returns the same id; the new handle is dropped.
    pub fn register(&mut self, task: Box<dyn ExtTask>) -> TaskId {
        let id = task.id();
        if self.tasks.contains_key(&id) {
            tracing::debug!("Task {} already registered", id);
            return id;
        }

        tracing::info!("Registered task {} ({})", id, task.name());
        self.last_id = self.last_id.max(id.0);
        self.tasks.insert(id, task);
        id
    }

    /// Hand out an id no registered task uses
    pub fn allocate_id(&mut self) -> TaskId {
        loop {
            self.last_id = self.last_id.wrapping_add(1).max(1);
            let id = TaskId(self.last_id);
            if !self.tasks.contains_key(&id) {
                return id;
            }
        }
    }

    pub fn is_registered(&self, id: TaskId) -> bool {
        self.tasks.contains_key(&id)
    }

    pub fn lookup(&self, id: TaskId) -> Result<&dyn ExtTask, TaskError> {
        self.tasks
            .get(&id)
            .map(|task| task.as_ref())
            .ok_or(TaskError::NotFound(id))
    }

    pub fn lookup_mut(&mut self, id: TaskId) -> Result<&mut dyn ExtTask, TaskError> {
        match self.tasks.get_mut(&id) {
            Some(task) => Ok(task.as_mut()),
            None => Err(TaskError::NotFound(id)),
        }
    }

    /// Remove a task; absent ids are ignored
    pub fn remove(&mut self, id: TaskId) -> Option<Box<dyn ExtTask>> {
        self.reported_exits.remove(&id);
        let removed = self.tasks.remove(&id);
        if removed.is_some() {
            tracing::info!("Removed task {}", id);
        }
        removed
    }

    pub fn ids(&self) -> Vec<TaskId> {
        self.tasks.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// One scheduler pass over every task
    ///
    /// Exited tasks are reported once and then skipped until removed. A task
    /// whose hook fails is logged and skipped for this pass.
    pub fn tick(&mut self) -> Vec<TaskEvent> {
        let mut events = Vec::new();

        for (&id, task) in self.tasks.iter_mut() {
            if task.has_exited() {
                if self.reported_exits.insert(id) {
                    tracing::info!("Task {} ({}) has exited", id, task.name());
                    events.push(TaskEvent::Exited { task: id });
                }
                continue;
            }

            if let Err(e) = task.tick() {
                tracing::warn!("Task {} tick failed: {}", id, e);
                continue;
            }

            while let Some(data) = task.try_recv_response() {
                events.push(TaskEvent::Output { task: id, data });
            }
        }

        events
    }

    /// Kill and drop every task
    pub fn teardown(&mut self) {
        for (id, mut task) in std::mem::take(&mut self.tasks) {
            if !task.has_exited() {
                if let Err(e) = task.kill() {
                    tracing::warn!("Failed to kill task {}: {}", id, e);
                }
            }
        }
        self.reported_exits.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    struct StubTask {
        id: TaskId,
        fail_tick: bool,
    }

    impl ExtTask for StubTask {
        fn id(&self) -> TaskId {
            self.id
        }

        fn name(&self) -> &str {
            "stub"
        }

        fn has_exited(&mut self) -> bool {
            false
        }

        fn tick(&mut self) -> Result<()> {
            if self.fail_tick {
                return Err(anyhow!("broken pipe"));
            }
            Ok(())
        }

        fn try_recv_response(&mut self) -> Option<Bytes> {
            Some(Bytes::from_static(b"never drained"))
        }

        fn kill(&mut self) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_allocate_id_skips_registered_ids() {
        let mut registry = TaskRegistry::new();
        registry.register(Box::new(StubTask {
            id: TaskId(1),
            fail_tick: false,
        }));
        assert_eq!(registry.allocate_id(), TaskId(2));
        assert_eq!(registry.allocate_id(), TaskId(3));
    }

    #[test]
    fn test_failing_tick_skips_response_drain() {
        let mut registry = TaskRegistry::new();
        registry.register(Box::new(StubTask {
            id: TaskId(4),
            fail_tick: true,
        }));
        assert!(registry.tick().is_empty());
    }
}
