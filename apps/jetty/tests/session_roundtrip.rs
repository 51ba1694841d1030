//! End-to-end against a loopback WebSocket server: real handshake,
//! real frames, execution state reconciled from a scripted session.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{Request, Response};

use jetty::protocol::WorkflowStatus;
use jetty::{Config, ConnectionManager, ConnectionStatus, ExecutionSync, Target, Viewport};

/// One-shot server: accepts a single connection, records the request
/// path, feeds the session script once the client asks for state, then
/// holds the socket open until the client closes it.
async fn spawn_server(script: Vec<String>) -> (Config, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind loopback");
    let addr = listener.local_addr().expect("local addr");
    let config = Config {
        api_origin: format!("http://{addr}"),
        ..Config::default()
    };

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.expect("accept");
        let mut path = String::new();
        let ws = accept_hdr_async(stream, |req: &Request, resp: Response| {
            path = req.uri().path().to_string();
            Ok(resp)
        })
        .await
        .expect("handshake");
        let (mut sink, mut source) = ws.split();

        // Play the script in response to the client's state request.
        while let Some(message) = source.next().await {
            let message = message.expect("server recv");
            if message.is_text() && message.to_text().expect("utf8").contains("request_state") {
                for line in &script {
                    sink.send(Message::Text(line.clone()))
                        .await
                        .expect("server send");
                }
                break;
            }
        }

        // Stay up until the client closes.
        while let Some(Ok(message)) = source.next().await {
            if message.is_close() {
                break;
            }
        }
        path
    });

    (config, server)
}

async fn wait_until(what: &str, mut done: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !done() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for {what}"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn workflow_session_reconciles_to_completed() {
    let script = vec![
        r#"{"type":"state_sync","status":"running","executing_nodes":{"n1":{"node_id":"n1","node_type":"http","started_at":1000.0,"duration_seconds":0.0}},"completed_nodes":[],"completed_count":0,"total_nodes":2}"#.to_string(),
        r#"{"type":"node_completed","node_id":"n1","node_type":"http","completed_at":2000.0,"duration_seconds":1.0,"route":"true"}"#.to_string(),
        r#"{"type":"workflow_completed","status":"completed","duration":1.0}"#.to_string(),
    ];
    let (config, server) = spawn_server(script).await;

    let manager = ConnectionManager::with_websocket(config);
    let execution = ExecutionSync::attach(&manager);
    manager.connect(Target::workflow("wf-42"));

    wait_until("terminal workflow state", || execution.is_finished()).await;

    let state = execution.snapshot();
    assert_eq!(state.status, WorkflowStatus::Completed);
    assert!(state.executing_nodes.is_empty());
    assert_eq!(state.completed_count, 1);
    assert_eq!(state.completed_nodes.len(), 1);
    assert_eq!(state.completed_nodes[0].node_id, "n1");
    assert_eq!(state.completed_nodes[0].route.as_deref(), Some("true"));
    assert_eq!(manager.status(), ConnectionStatus::Connected);

    manager.disconnect();
    let path = server.await.expect("server task");
    assert_eq!(path, "/ws/workflow/wf-42/");
    assert_eq!(manager.status(), ConnectionStatus::Disconnected);
}

#[tokio::test(flavor = "multi_thread")]
async fn video_session_delivers_frames_and_viewport() {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind loopback");
    let addr = listener.local_addr().expect("local addr");
    let config = Config {
        api_origin: format!("http://{addr}"),
        ..Config::default()
    };

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.expect("accept");
        let mut path = String::new();
        let ws = accept_hdr_async(stream, |req: &Request, resp: Response| {
            path = req.uri().path().to_string();
            Ok(resp)
        })
        .await
        .expect("handshake");
        let (mut sink, mut source) = ws.split();

        let mut frame = Vec::new();
        frame.extend_from_slice(&1920u32.to_be_bytes());
        frame.extend_from_slice(&1080u32.to_be_bytes());
        frame.extend_from_slice(&[0xD8; 200]);
        sink.send(Message::Binary(frame)).await.expect("server send");

        while let Some(Ok(message)) = source.next().await {
            if message.is_close() {
                break;
            }
        }
        path
    });

    let manager = ConnectionManager::with_websocket(config);
    manager.connect(Target::Video);

    {
        let manager = manager.clone();
        wait_until("first frame viewport", move || manager.viewport().is_some()).await;
    }
    assert_eq!(
        manager.viewport(),
        Some(Viewport {
            width: 1920,
            height: 1080
        })
    );

    manager.disconnect();
    let path = server.await.expect("server task");
    assert_eq!(path, "/ws/video/");
}
