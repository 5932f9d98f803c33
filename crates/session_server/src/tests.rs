use crate::test_support::MockTransport;
use crate::*;
use futures::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_tungstenite::{connect_async, tungstenite::Message};

fn recorder() -> (Arc<Mutex<Vec<ConnectionId>>>, impl Fn(&Arc<Connection>) + Send + Sync + 'static) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    (seen, move |connection: &Arc<Connection>| sink.lock().unwrap().push(connection.id()))
}

#[test]
fn test_scenario_no_subscribers_refuses_with_server_full() {
    let registry = ConnectionRegistry::new();
    let socket = MockTransport::new();

    let admission = registry.on_connection_attempt(socket.clone());

    assert!(!admission.is_approved());
    assert_eq!(socket.closes(), vec![ErrorDescriptor::new(100, "Server Full")]);
    assert!(registry.is_empty());
}

#[test]
fn test_scenario_allow_all_admits_and_notifies() {
    let registry = ConnectionRegistry::new();
    registry.on_connection_request(|request| request.allow());
    let (connects, on_connect) = recorder();
    registry.on_connect(on_connect);
    let socket = MockTransport::from_addr("127.0.0.1:40000");

    let connection = registry.on_connection_attempt(socket.clone()).approved().unwrap();

    assert_eq!(registry.len(), 1);
    assert_eq!(*connects.lock().unwrap(), vec![connection.id()]);
    assert_eq!(connection.remote_addr(), Some("127.0.0.1:40000".parse().unwrap()));
    assert!(socket.closes().is_empty());
}

#[test]
fn test_scenario_deny_beats_allow() {
    let registry = ConnectionRegistry::new();
    registry.on_connection_request(|request| request.allow());
    registry.on_connection_request(|request| {
        request.deny(ErrorDescriptor::new(42, "banned")).unwrap();
    });
    let (connects, on_connect) = recorder();
    registry.on_connect(on_connect);
    let socket = MockTransport::new();

    let admission = registry.on_connection_attempt(socket.clone());

    assert_eq!(admission.denied(), Some(&ErrorDescriptor::new(42, "banned")));
    assert_eq!(socket.closes(), vec![ErrorDescriptor::new(42, "banned")]);
    assert!(registry.is_empty());
    assert!(connects.lock().unwrap().is_empty());
}

#[test]
fn test_scenario_transport_close_then_explicit_disconnect() {
    let registry = ConnectionRegistry::new();
    registry.on_connection_request(|request| request.allow());
    let (disconnects, on_disconnect) = recorder();
    registry.on_disconnect(on_disconnect);
    let socket = MockTransport::new();
    let connection = registry.on_connection_attempt(socket.clone()).approved().unwrap();

    connection.handle_transport_closed();

    assert_eq!(*disconnects.lock().unwrap(), vec![connection.id()]);
    assert!(!registry.contains(connection.id()));

    connection.disconnect(ErrorDescriptor::session_terminated()).unwrap();
    assert_eq!(disconnects.lock().unwrap().len(), 1);
    assert!(socket.closes().is_empty());
}

#[test]
fn test_last_deny_wins() {
    let registry = ConnectionRegistry::new();
    registry.on_connection_request(|request| {
        request.deny(ErrorDescriptor::new(1, "first")).unwrap();
    });
    registry.on_connection_request(|request| request.allow());
    registry.on_connection_request(|request| {
        request.deny(ErrorDescriptor::new(2, "second")).unwrap();
    });

    let admission = registry.on_connection_attempt(MockTransport::new());
    assert_eq!(admission.denied(), Some(&ErrorDescriptor::new(2, "second")));
}

#[test]
fn test_subscribers_run_in_registration_order() {
    let registry = ConnectionRegistry::new();
    let order = Arc::new(Mutex::new(Vec::new()));
    for label in ["capacity", "ban", "rate"] {
        let order = order.clone();
        registry.on_connection_request(move |_| order.lock().unwrap().push(label));
    }

    registry.on_connection_attempt(MockTransport::new());
    assert_eq!(*order.lock().unwrap(), vec!["capacity", "ban", "rate"]);
}

#[test]
fn test_one_request_per_attempt() {
    let registry = ConnectionRegistry::new();
    let requests = Arc::new(AtomicUsize::new(0));
    let counter = requests.clone();
    registry.on_connection_request(move |request| {
        counter.fetch_add(1, Ordering::SeqCst);
        request.allow();
    });

    for _ in 0..5 {
        registry.on_connection_attempt(MockTransport::new());
    }
    assert_eq!(requests.load(Ordering::SeqCst), 5);
    assert_eq!(registry.len(), 5);
}

#[test]
fn test_concurrent_attempts_respect_capacity() {
    let registry = ConnectionRegistry::new();
    CapacityGate::new(8).install(&registry);

    let handles: Vec<_> = (0..32)
        .map(|_| {
            let registry = registry.clone();
            std::thread::spawn(move || registry.on_connection_attempt(MockTransport::new()).is_approved())
        })
        .collect();
    let admitted = handles
        .into_iter()
        .map(|handle| handle.join().unwrap())
        .filter(|approved| *approved)
        .count();

    assert_eq!(admitted, 8);
    assert_eq!(registry.len(), 8);
}

#[test]
fn test_disconnect_from_disconnect_handler_does_not_double_fire() {
    let registry = ConnectionRegistry::new();
    registry.on_connection_request(|request| request.allow());
    let fired = Arc::new(AtomicUsize::new(0));
    let counter = fired.clone();
    registry.on_disconnect(move |connection| {
        counter.fetch_add(1, Ordering::SeqCst);
        connection.disconnect(ErrorDescriptor::session_terminated()).unwrap();
    });
    let connection = registry.on_connection_attempt(MockTransport::new()).approved().unwrap();

    connection.handle_transport_closed();

    assert_eq!(fired.load(Ordering::SeqCst), 1);
}

// End-to-end over a real socket.

fn local_config() -> ServerConfig {
    ServerConfig {
        bind_address: "127.0.0.1:0".parse().unwrap(),
        ..Default::default()
    }
}

async fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

/// Reads frames until the close frame, returning the JSON notices seen and
/// the close code.
async fn read_until_close<S>(ws: &mut S) -> (Vec<serde_json::Value>, Option<(u16, String)>)
where
    S: futures::Stream<Item = std::result::Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    let mut notices = Vec::new();
    let read = async {
        while let Some(Ok(message)) = ws.next().await {
            match message {
                Message::Text(text) => notices.push(serde_json::from_str(text.as_str()).unwrap()),
                Message::Close(frame) => {
                    return frame.map(|frame| (u16::from(frame.code), frame.reason.as_str().to_string()));
                }
                _ => {}
            }
        }
        None
    };
    let close = tokio::time::timeout(Duration::from_secs(5), read)
        .await
        .expect("server should close the socket");
    (notices, close)
}

#[tokio::test(flavor = "multi_thread")]
async fn test_websocket_client_is_admitted() {
    let server = SessionServer::new(local_config());
    server.registry().on_connection_request(|request| request.allow());
    let received = Arc::new(Mutex::new(Vec::new()));
    let sink = received.clone();
    server.registry().on_connect(move |connection| {
        let sink = sink.clone();
        connection.on_message(move |_, message| sink.lock().unwrap().push(message));
    });

    let addr = server.start().await.unwrap();
    let (mut ws, _) = connect_async(format!("ws://{addr}")).await.unwrap();

    assert!(eventually(|| server.registry().len() == 1).await);

    ws.send(Message::text(r#"{"namespace":"chat","event":"say","data":{"text":"hi"}}"#.to_string()))
        .await
        .unwrap();
    assert!(eventually(|| received.lock().unwrap().len() == 1).await);
    {
        let received = received.lock().unwrap();
        assert_eq!(received[0].namespace, "chat");
        assert_eq!(received[0].data["text"], "hi");
    }

    ws.close(None).await.unwrap();
    assert!(eventually(|| server.registry().is_empty()).await);

    server.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_websocket_client_refused_without_subscribers() {
    let server = SessionServer::new(local_config());
    let addr = server.start().await.unwrap();

    let (mut ws, _) = connect_async(format!("ws://{addr}")).await.unwrap();
    let (notices, close) = read_until_close(&mut ws).await;

    assert_eq!(notices, vec![serde_json::json!({ "error": { "id": 100, "msg": "Server Full" } })]);
    assert_eq!(close, Some((4100, "Server Full".to_string())));
    assert!(server.registry().is_empty());

    server.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_server_side_disconnect_reaches_client() {
    let server = SessionServer::new(local_config());
    server.registry().on_connection_request(|request| request.allow());
    let addr = server.start().await.unwrap();

    let (mut ws, _) = connect_async(format!("ws://{addr}")).await.unwrap();
    assert!(eventually(|| server.registry().len() == 1).await);

    let connection = server.registry().connections().remove(0);
    connection.disconnect(ErrorDescriptor::new(7, "kicked")).unwrap();

    let (notices, close) = read_until_close(&mut ws).await;
    assert_eq!(notices, vec![serde_json::json!({ "error": { "id": 7, "msg": "kicked" } })]);
    assert_eq!(close, Some((4007, "kicked".to_string())));
    assert!(server.registry().is_empty());

    server.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_start_stop_lifecycle() {
    let server = SessionServer::new(local_config());
    assert!(!server.is_active());
    assert!(server.local_addr().is_none());

    let addr = server.start().await.unwrap();
    assert!(server.is_active());
    assert_eq!(server.local_addr(), Some(addr));
    assert!(matches!(server.start().await, Err(SessionError::Network(_))));

    server.stop().await;
    assert!(!server.is_active());
    assert!(connect_async(format!("ws://{addr}")).await.is_err());

    // Stopping twice is harmless.
    server.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_stop_leaves_live_connections() {
    let server = SessionServer::new(local_config());
    server.registry().on_connection_request(|request| request.allow());
    let addr = server.start().await.unwrap();

    let (_ws, _) = connect_async(format!("ws://{addr}")).await.unwrap();
    assert!(eventually(|| server.registry().len() == 1).await);

    server.stop().await;
    assert_eq!(server.registry().len(), 1);

    let count = server
        .registry()
        .disconnect_all(&ErrorDescriptor::session_terminated());
    assert_eq!(count, 1);
    assert!(server.registry().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_default_gates_ban_loopback() {
    let mut config = local_config();
    config.security.banned_ips = vec!["127.0.0.1".parse().unwrap()];
    let server = create_server_with_config(config);
    let addr = server.start().await.unwrap();

    let (mut ws, _) = connect_async(format!("ws://{addr}")).await.unwrap();
    let (_, close) = read_until_close(&mut ws).await;

    assert_eq!(close, Some((4102, "Banned".to_string())));
    server.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_oversized_message_fails_the_socket() {
    let config = ServerConfig {
        max_message_size: 1024,
        ..local_config()
    };
    let server = SessionServer::new(config);
    server.registry().on_connection_request(|request| request.allow());
    let delivered = Arc::new(AtomicUsize::new(0));
    let counter = delivered.clone();
    server.registry().on_connect(move |connection| {
        let counter = counter.clone();
        connection.on_message(move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
    });
    let addr = server.start().await.unwrap();

    let (mut ws, _) = connect_async(format!("ws://{addr}")).await.unwrap();
    assert!(eventually(|| server.registry().len() == 1).await);

    let padding = "x".repeat(8 * 1024);
    let oversized = format!(r#"{{"namespace":"chat","event":"say","data":{{"text":"{padding}"}}}}"#);
    let _ = ws.send(Message::text(oversized)).await;

    assert!(eventually(|| server.registry().is_empty()).await);
    assert_eq!(delivered.load(Ordering::SeqCst), 0);

    server.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_stalled_handshake_is_dropped() {
    use tokio::io::AsyncReadExt;

    let config = ServerConfig {
        handshake_timeout_ms: 100,
        ..local_config()
    };
    let server = SessionServer::new(config);
    server.registry().on_connection_request(|request| request.allow());
    let addr = server.start().await.unwrap();

    let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
    let mut buf = [0u8; 16];
    let read = tokio::time::timeout(Duration::from_secs(3), stream.read(&mut buf))
        .await
        .expect("server should drop a peer that never upgrades");

    assert!(matches!(read, Ok(0) | Err(_)));
    assert!(server.registry().is_empty());

    server.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_pong_keeps_client_alive_and_silent_client_is_reaped() {
    let config = ServerConfig {
        liveness_window_ms: 400,
        reap_interval_ms: 50,
        ..local_config()
    };
    let server = SessionServer::new(config);
    server.registry().on_connection_request(|request| request.allow());
    let addr = server.start().await.unwrap();

    // Reading lets the client answer the server's pings.
    let (mut responsive, _) = connect_async(format!("ws://{addr}")).await.unwrap();
    let reader = tokio::spawn(async move { while let Some(Ok(_)) = responsive.next().await {} });
    assert!(eventually(|| server.registry().len() == 1).await);
    let responsive_id = server.registry().connections()[0].id();

    let (mut silent, _) = connect_async(format!("ws://{addr}")).await.unwrap();
    assert!(eventually(|| server.registry().len() == 2).await);

    tokio::time::sleep(Duration::from_millis(5 * 400)).await;

    assert_eq!(server.registry().len(), 1);
    assert!(server.registry().contains(responsive_id));

    let (notices, close) = read_until_close(&mut silent).await;
    assert_eq!(
        notices,
        vec![serde_json::json!({ "error": { "id": 101, "msg": "Session Terminated" } })]
    );
    assert_eq!(close, Some((4101, "Session Terminated".to_string())));

    reader.abort();
    server.stop().await;
}
