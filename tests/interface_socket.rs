//! End-to-end scenario 2 from spec.md §8: a plaintext socket against a
//! line-echo JSON server.

use std::sync::{Arc, Mutex};

use bytes::Bytes;
use sioba::{interface_from_uri, Interface, InterfaceContext};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

async fn spawn_line_echo_json_server() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        if let Ok((mut socket, _)) = listener.accept().await {
            let mut buf = vec![0u8; 1024];
            loop {
                let n = match socket.read(&mut buf).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => n,
                };
                let line = String::from_utf8_lossy(&buf[..n]);
                let line = line.trim_end_matches(['\n', '\r']);
                let reply = format!(r#"{{"status":"ok","data":"{line}"}}"#);
                if socket.write_all(reply.as_bytes()).await.is_err() {
                    break;
                }
            }
        }
    });
    port
}

#[tokio::test]
async fn plaintext_socket_round_trips_through_server() {
    let port = spawn_line_echo_json_server().await;
    let iface = interface_from_uri(&format!("tcp://127.0.0.1:{port}"), None, InterfaceContext::default()).unwrap();
    iface.start().await.unwrap();

    let seen: Arc<Mutex<Vec<Bytes>>> = Arc::new(Mutex::new(Vec::new()));
    let seen2 = seen.clone();
    iface.on_send_to_frontend(Arc::new(move |data| {
        let seen = seen2.clone();
        Box::pin(async move {
            seen.lock().unwrap().push(data);
        })
    }));

    iface.receive_from_frontend(Bytes::from_static(b"HELLO\n")).await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(&seen[0][..], br#"{"status":"ok","data":"HELLO"}"#);
}
