//! End-to-end scenario 1 from spec.md §8: echo round-trip.

use std::sync::{Arc, Mutex};

use bytes::Bytes;
use sioba::{interface_from_uri, Interface, InterfaceContext};

#[tokio::test]
async fn echo_round_trips_exact_bytes() {
    let iface = interface_from_uri("echo://", None, InterfaceContext::default()).unwrap();
    iface.start().await.unwrap();

    let seen: Arc<Mutex<Vec<Bytes>>> = Arc::new(Mutex::new(Vec::new()));
    let seen2 = seen.clone();
    iface.on_send_to_frontend(Arc::new(move |data| {
        let seen = seen2.clone();
        Box::pin(async move {
            seen.lock().unwrap().push(data);
        })
    }));

    iface.receive_from_frontend(Bytes::from_static(b"Hello, World!")).await.unwrap();

    let seen = seen.lock().unwrap();
    assert_eq!(seen.as_slice(), &[Bytes::from_static(b"Hello, World!")]);
}

#[tokio::test]
async fn not_started_before_start() {
    let iface = interface_from_uri("echo://", None, InterfaceContext::default()).unwrap();
    let err = iface.send_to_frontend(Bytes::from_static(b"x")).await.unwrap_err();
    assert!(matches!(err, sioba::SiobaError::NotStarted));
}

#[tokio::test]
async fn terminal_closed_after_shutdown() {
    let iface = interface_from_uri("echo://", None, InterfaceContext::default()).unwrap();
    iface.start().await.unwrap();
    iface.shutdown().await.unwrap();
    let err = iface.send_to_frontend(Bytes::from_static(b"x")).await.unwrap_err();
    assert!(matches!(err, sioba::SiobaError::TerminalClosed));
    // Further shutdowns are no-ops.
    iface.shutdown().await.unwrap();
}
