//! Integration tests for PTY-backed tasks, using a real /bin/sh

use std::time::{Duration, Instant};
use termvisor::client::tokenize;
use termvisor::dbus::{ChannelBus, ResourceMeta, ResourceType};
use termvisor::hypervisor::{ExtTask, PtySpawner, PtyTask, TaskSpawner};
use termvisor::msg::{serialize, MessagePutChar, MessageTokenizedCommand, TaskId, TerminalId};

fn command(line: &str) -> MessageTokenizedCommand {
    let mut words = line.split_whitespace().map(String::from);
    MessageTokenizedCommand {
        command: words.next().unwrap(),
        args: words.collect(),
    }
}

/// Tick `task` until `done` holds for the collected output or the deadline passes
fn tick_until(task: &mut dyn ExtTask, output: &mut String, done: impl Fn(&str) -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        task.tick().unwrap();
        while let Some(chunk) = task.try_recv_response() {
            output.push_str(&String::from_utf8_lossy(&chunk));
        }
        if done(output) {
            return true;
        }
        std::thread::sleep(Duration::from_millis(20));
    }
    false
}

#[test]
fn test_published_command_runs_in_shell() {
    let mut bus = ChannelBus::new();
    let terminal = ResourceMeta::new(TerminalId(1), ResourceType::Terminal);
    let channel = bus.create_channel(terminal);
    let input = bus
        .subscribe(channel, ResourceMeta::new(TaskId(1), ResourceType::Process))
        .unwrap();

    let mut task = PtyTask::spawn(TaskId(1), "/bin/sh", None, (80, 24), input).unwrap();
    assert!(task.pid().is_some());

    // Non-command input is ignored by the process
    bus.publish(channel, &terminal, serialize(&MessagePutChar { ch: 'x' }))
        .unwrap();
    bus.publish(channel, &terminal, serialize(&command("expr 40 + 2")))
        .unwrap();

    let mut output = String::new();
    assert!(
        tick_until(&mut task, &mut output, |out| out.contains("42")),
        "Shell output was: {:?}",
        output
    );

    bus.publish(channel, &terminal, serialize(&command("exit 3")))
        .unwrap();
    let mut rest = String::new();
    let deadline = Instant::now() + Duration::from_secs(5);
    while !task.has_exited() && Instant::now() < deadline {
        tick_until(&mut task, &mut rest, |_| true);
        std::thread::sleep(Duration::from_millis(20));
    }

    assert!(task.has_exited());
    assert_eq!(task.exit_code(), Some(3));
}

#[test]
fn test_quoted_and_empty_arguments_reach_shell_intact() {
    let mut bus = ChannelBus::new();
    let terminal = ResourceMeta::new(TerminalId(1), ResourceType::Terminal);
    let channel = bus.create_channel(terminal);
    let input = bus
        .subscribe(channel, ResourceMeta::new(TaskId(1), ResourceType::Process))
        .unwrap();
    let mut task = PtyTask::spawn(TaskId(1), "/bin/sh", None, (80, 24), input).unwrap();

    let line = tokenize(r#"printf '[%s]' 'a|b' '' "it's" '$HOME'"#)
        .unwrap()
        .unwrap();
    assert_eq!(line.args, vec!["[%s]", "a|b", "", "it's", "$HOME"]);
    bus.publish(channel, &terminal, serialize(&line)).unwrap();

    let expected = "[a|b][][it's][$HOME]";
    let mut output = String::new();
    assert!(
        tick_until(&mut task, &mut output, |out| out.contains(expected)),
        "Shell output was: {:?}",
        output
    );

    task.kill().unwrap();
}

#[test]
fn test_spawner_builds_killable_tasks() {
    let mut bus = ChannelBus::new();
    let channel = bus.create_channel(ResourceMeta::new(TerminalId(1), ResourceType::Terminal));
    let input = bus
        .subscribe(channel, ResourceMeta::new(TaskId(7), ResourceType::Process))
        .unwrap();

    let spawner = PtySpawner::new("/bin/sh", (80, 24)).with_working_dir(std::env::temp_dir());
    let mut task = spawner.spawn(TaskId(7), input).unwrap();
    assert_eq!(task.id(), TaskId(7));
    assert_eq!(task.name(), "/bin/sh");
    assert!(!task.has_exited());

    task.kill().unwrap();
    let deadline = Instant::now() + Duration::from_secs(5);
    while !task.has_exited() && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(20));
    }
    assert!(task.has_exited());
}

#[test]
fn test_missing_program_fails_to_spawn() {
    let mut bus = ChannelBus::new();
    let channel = bus.create_channel(ResourceMeta::new(TerminalId(1), ResourceType::Terminal));
    let input = bus
        .subscribe(channel, ResourceMeta::new(TaskId(1), ResourceType::Process))
        .unwrap();

    let spawner = PtySpawner::new("/nonexistent/termvisor-test-program", (80, 24));
    assert!(spawner.spawn(TaskId(1), input).is_err());
}
