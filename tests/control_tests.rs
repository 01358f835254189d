mod test_harness;

use std::time::Duration;

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;

use autoseg::control::protocol::{self, CommandName};
use autoseg::control::{
    ControlClient, ControlError, ControlRequest, ControlResponse, ControlServer, Payload,
    ProcessingState,
};
use autoseg::error::AutosegError;
use autoseg::scheduler::Stage;
use test_harness::{registry, RecordingProcessor, TestRoot};

/// Start a control server for a fresh working root on an ephemeral port.
async fn start_server(root: &TestRoot) -> (String, CancellationToken) {
    let orch = root.orchestrator(registry(RecordingProcessor::succeeding()));
    let server = ControlServer::bind(
        "127.0.0.1:0".parse().unwrap(),
        orch.control_service(),
        Duration::from_millis(500),
    )
    .await
    .unwrap();
    let addr = server.local_addr().unwrap().to_string();
    let shutdown = CancellationToken::new();
    tokio::spawn(server.run(shutdown.clone()));
    (addr, shutdown)
}

fn client(addr: &str) -> ControlClient {
    ControlClient::new(addr, Duration::from_secs(2))
}

#[tokio::test]
async fn test_jobs_over_tcp() {
    let root = TestRoot::new();
    let (addr, shutdown) = start_server(&root).await;

    let resp = client(&addr).request(&ControlRequest::Jobs).await.unwrap();
    assert_eq!(resp.command, CommandName::Jobs);
    match resp.payload {
        Payload::Queue(listing) => {
            assert!(listing.current.is_none());
            assert!(listing.queued.is_empty());
        }
        other => panic!("unexpected payload {:?}", other),
    }
    shutdown.cancel();
}

#[tokio::test]
async fn test_pause_state_over_tcp() {
    let root = TestRoot::new();
    let (addr, shutdown) = start_server(&root).await;
    let client = client(&addr);

    let resp = client.request(&ControlRequest::Pause).await.unwrap();
    assert_eq!(resp.payload, Payload::Processing(ProcessingState::Paused));
    let resp = client.request(&ControlRequest::Pause).await.unwrap();
    assert_eq!(resp.payload, Payload::Error(ControlError::AlreadyPaused));
    let resp = client.request(&ControlRequest::Unpause).await.unwrap();
    assert_eq!(resp.payload, Payload::Processing(ProcessingState::Unpaused));
    shutdown.cancel();
}

#[tokio::test]
async fn test_info_unknown_job_over_tcp() {
    let root = TestRoot::new();
    let (addr, shutdown) = start_server(&root).await;

    let resp = client(&addr)
        .request(&ControlRequest::Info {
            name: "nothing".into(),
        })
        .await
        .unwrap();
    assert_eq!(resp.command, CommandName::Info);
    assert_eq!(
        resp.payload,
        Payload::Error(ControlError::NotFound {
            name: "nothing".into()
        })
    );
    shutdown.cancel();
}

#[tokio::test]
async fn test_completed_lists_done_jobs() {
    let root = TestRoot::new();
    let done = root.job_dir(Stage::Done, "C0100");
    std::fs::create_dir_all(&done).unwrap();
    std::fs::write(
        done.join("C0100.COM"),
        "$ EVAL_FNAME :== knee\n$ TARGET_FILE :== C0100.AIM\n",
    )
    .unwrap();
    let (addr, shutdown) = start_server(&root).await;

    let resp = client(&addr)
        .request(&ControlRequest::Completed)
        .await
        .unwrap();
    match resp.payload {
        Payload::Jobs(jobs) => {
            assert_eq!(jobs.len(), 1);
            assert_eq!(jobs[0].id, "C0100");
            assert_eq!(jobs[0].name, "knee");
        }
        other => panic!("unexpected payload {:?}", other),
    }
    shutdown.cancel();
}

#[tokio::test]
async fn test_undecodable_request_gets_invalid_response() {
    let root = TestRoot::new();
    let (addr, shutdown) = start_server(&root).await;

    let stream = TcpStream::connect(&addr).await.unwrap();
    let mut framed = Framed::new(stream, protocol::codec());
    framed
        .send(Bytes::from_static(br#"{"command": "reboot"}"#))
        .await
        .unwrap();
    let frame = framed.next().await.unwrap().unwrap();
    let resp: ControlResponse = protocol::decode(&frame).unwrap();
    assert_eq!(resp.command, CommandName::Invalid);
    assert!(matches!(
        resp.payload,
        Payload::Error(ControlError::Invalid { .. })
    ));

    // The server keeps serving after a bad request
    let resp = client(&addr).request(&ControlRequest::Jobs).await.unwrap();
    assert!(!resp.is_error());
    shutdown.cancel();
}

#[tokio::test]
async fn test_silent_server_is_no_response() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    // Accept and hold the connection without ever answering
    let holder = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        tokio::time::sleep(Duration::from_secs(5)).await;
        drop(stream);
    });

    let client = ControlClient::new(&addr, Duration::from_millis(200));
    let err = client.request(&ControlRequest::Jobs).await.unwrap_err();
    assert!(matches!(err, AutosegError::NoResponse));
    holder.abort();
}

#[tokio::test]
async fn test_unreachable_server_is_no_response() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    drop(listener);

    let err = client(&addr)
        .request(&ControlRequest::Jobs)
        .await
        .unwrap_err();
    assert!(matches!(err, AutosegError::NoResponse));
}

#[tokio::test]
async fn test_server_stops_on_shutdown() {
    let root = TestRoot::new();
    let orch = root.orchestrator(registry(RecordingProcessor::succeeding()));
    let server = ControlServer::bind(
        "127.0.0.1:0".parse().unwrap(),
        orch.control_service(),
        Duration::from_millis(500),
    )
    .await
    .unwrap();
    let shutdown = CancellationToken::new();
    let handle = tokio::spawn(server.run(shutdown.clone()));
    shutdown.cancel();
    tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("server should stop")
        .unwrap();
}
