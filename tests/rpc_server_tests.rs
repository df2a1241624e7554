//! Integration tests for the RPC server and client

mod common;

use common::FakeSpawner;
use std::path::Path;
use std::time::Duration;
use tempfile::tempdir;
use termvisor::client::Session;
use termvisor::config::Config;
use termvisor::hypervisor::Hypervisor;
use termvisor::msg::{MessageTokenizedCommand, TaskId, TerminalId};
use termvisor::rpc::{RpcClient, RpcError, RpcServer, LIST_TERMINAL_IDS, MAX_MESSAGE_SIZE};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

struct Harness {
    spawner: FakeSpawner,
    hv_shutdown: mpsc::Sender<()>,
    rpc_shutdown: mpsc::Sender<()>,
    server: JoinHandle<anyhow::Result<()>>,
    hypervisor: JoinHandle<()>,
}

impl Harness {
    async fn start(socket_path: &Path) -> Self {
        let spawner = FakeSpawner::default();
        let mut config = Config::default();
        config.general.tick_interval_ms = 1;
        let hv = Hypervisor::new(&config, Box::new(spawner.clone()));
        let calls = hv.call_sender();

        let (hv_shutdown, hv_rx) = mpsc::channel(1);
        let (rpc_shutdown, rpc_rx) = mpsc::channel(1);
        let hypervisor = tokio::spawn(hv.run(hv_rx));

        let server = RpcServer::new(socket_path.to_path_buf(), MAX_MESSAGE_SIZE);
        let server = tokio::spawn(async move { server.run(calls, rpc_rx).await });

        // Wait for server to start
        for _ in 0..50 {
            if UnixStream::connect(socket_path).await.is_ok() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        Self {
            spawner,
            hv_shutdown,
            rpc_shutdown,
            server,
            hypervisor,
        }
    }

    async fn stop(self) -> FakeSpawner {
        self.rpc_shutdown.send(()).await.unwrap();
        self.server.await.unwrap().unwrap();
        self.hv_shutdown.send(()).await.unwrap();
        self.hypervisor.await.unwrap();
        self.spawner
    }
}

#[tokio::test]
async fn test_session_round_trip() {
    let temp_dir = tempdir().unwrap();
    let socket_path = temp_dir.path().join("test.sock");
    let harness = Harness::start(&socket_path).await;

    let client = RpcClient::connect(&socket_path, Duration::from_secs(2))
        .await
        .unwrap();
    let mut session = Session::from_client(client);

    assert!(session.get_terminal_ids().await.unwrap().is_empty());

    let tid = session.start_terminal_with_process().await.unwrap();
    assert_eq!(tid, TerminalId(1));
    assert_eq!(session.get_terminal_ids().await.unwrap(), vec![tid]);
    assert_eq!(session.get_process_ids().await.unwrap(), vec![TaskId(1)]);

    let pairs = session.get_term_ids_with_process_ids().await.unwrap();
    assert_eq!(pairs[0].attached_process_id, Some(TaskId(1)));

    let info = session.get_term_channel_info(tid).await.unwrap();
    assert_eq!(info.subscribers.len(), 1);

    session.put_text(tid, "ok").await.unwrap();
    session
        .run_command(
            tid,
            MessageTokenizedCommand {
                command: "true".to_string(),
                args: vec![],
            },
        )
        .await
        .unwrap();

    // The command is published on a later tick
    tokio::time::sleep(Duration::from_millis(100)).await;

    let spawner = harness.stop().await;
    assert_eq!(spawner.handle(TaskId(1)).received().len(), 1);
    assert!(spawner.handle(TaskId(1)).was_killed());
    assert!(!socket_path.exists(), "Socket should be removed on shutdown");
}

#[tokio::test]
async fn test_remote_errors_are_reported() {
    let temp_dir = tempdir().unwrap();
    let socket_path = temp_dir.path().join("errors.sock");
    let harness = Harness::start(&socket_path).await;

    let mut client = RpcClient::connect(&socket_path, Duration::from_secs(2))
        .await
        .unwrap();

    let err = client.send_to_rpc("NoSuchMethod", &[]).await.unwrap_err();
    assert!(matches!(err, RpcError::Remote(ref m) if m.contains("NoSuchMethod")));

    let mut session = Session::from_client(client);
    let err = session.clear(TerminalId(5)).await.unwrap_err();
    assert!(err.to_string().contains("Terminal with id 5 doesn't exist"));

    // The connection stays usable after an error
    assert!(session.get_terminal_ids().await.unwrap().is_empty());

    harness.stop().await;
}

#[tokio::test]
async fn test_client_times_out_when_no_response() {
    let temp_dir = tempdir().unwrap();
    let socket_path = temp_dir.path().join("silent.sock");
    let listener = UnixListener::bind(&socket_path).unwrap();

    // Accept and never answer
    let silent = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        tokio::time::sleep(Duration::from_secs(5)).await;
        drop(stream);
    });

    let mut client = RpcClient::connect(&socket_path, Duration::from_millis(100))
        .await
        .unwrap();

    let err = client.send_to_rpc(LIST_TERMINAL_IDS, &[]).await.unwrap_err();
    assert!(matches!(err, RpcError::Timeout(d) if d == Duration::from_millis(100)));

    // A late reply could be mistaken for the next answer, so the client gives up
    let err = client.send_to_rpc(LIST_TERMINAL_IDS, &[]).await.unwrap_err();
    assert!(matches!(err, RpcError::Closed));

    silent.abort();
}

#[tokio::test]
async fn test_second_server_refuses_live_socket() {
    let temp_dir = tempdir().unwrap();
    let socket_path = temp_dir.path().join("busy.sock");
    let harness = Harness::start(&socket_path).await;

    let (calls, _calls_rx) = mpsc::channel(1);
    let (_tx, rx) = mpsc::channel(1);
    let second = RpcServer::new(socket_path.clone(), MAX_MESSAGE_SIZE);
    assert!(second.socket_exists());
    assert!(second.run(calls, rx).await.is_err());

    harness.stop().await;
}

#[tokio::test]
async fn test_stale_socket_is_replaced() {
    let temp_dir = tempdir().unwrap();
    let socket_path = temp_dir.path().join("stale.sock");
    drop(UnixListener::bind(&socket_path).unwrap());
    assert!(socket_path.exists());

    let harness = Harness::start(&socket_path).await;
    let mut client = RpcClient::connect(&socket_path, Duration::from_secs(2))
        .await
        .unwrap();
    assert!(client.send_to_rpc(LIST_TERMINAL_IDS, &[]).await.is_ok());

    harness.stop().await;
}
