mod common;

use capture_daemon::server;
use common::{FakeBackend, Harness};
use shared::ipc::{protocol, ClientMessage, DaemonMessage};
use tokio::net::UnixStream;

#[tokio::test]
async fn clients_are_answered_over_the_socket() {
    let dir = tempfile::tempdir().unwrap();
    let socket = dir.path().join("capture.sock");
    // a leftover socket file from a crashed run must not block startup
    std::fs::write(&socket, b"stale").unwrap();

    let harness = Harness::start(FakeBackend::new());
    let listener = server::bind(&socket).unwrap();
    let serving = tokio::spawn(server::serve(listener, harness.events.clone()));

    let mut stream = UnixStream::connect(&socket).await.unwrap();
    protocol::send_message(&mut stream, &ClientMessage::SelectCategory("numeros".into()))
        .await
        .unwrap();
    match protocol::receive_message::<_, DaemonMessage>(&mut stream).await.unwrap() {
        DaemonMessage::Selection(selection) => {
            assert_eq!(selection.category, "numeros");
            assert_eq!(selection.label, "0");
        }
        other => panic!("unexpected reply: {:?}", other),
    }

    protocol::send_message(&mut stream, &ClientMessage::GetStatus)
        .await
        .unwrap();
    match protocol::receive_message::<_, DaemonMessage>(&mut stream).await.unwrap() {
        DaemonMessage::Status(status) => {
            assert!(status.capture_enabled);
            assert_eq!(status.selection.label, "0");
        }
        other => panic!("unexpected reply: {:?}", other),
    }
    drop(stream);

    let mut second = UnixStream::connect(&socket).await.unwrap();
    protocol::send_message(&mut second, &ClientMessage::StartRecording)
        .await
        .unwrap();
    assert!(matches!(
        protocol::receive_message::<_, DaemonMessage>(&mut second).await.unwrap(),
        DaemonMessage::Error(_)
    ));

    serving.abort();
    harness.shutdown().await;
}
