//! Transport integration tests
//!
//! Exercise the sender connection and the blocking receiver over real
//! loopback sockets.

use std::io::Read;
use std::net::TcpListener;
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use mlc_tracking_rust::config::TrackingConfig;
use mlc_tracking_rust::io::{TrackingClient, TrackingReceiver};
use mlc_tracking_rust::protocol::{TrackingHeader, TrackingMessage};
use mlc_tracking_rust::TrackingError;

fn message(side: usize, marker: u16) -> TrackingMessage {
    TrackingMessage {
        header: TrackingHeader {
            payload_byte_count: (side * side * 2) as u32,
            slice_position_transverse: marker as f64,
            width: side as i32,
            height: side as i32,
            ..TrackingHeader::default()
        },
        pixels: vec![marker; side * side],
    }
}

fn unused_addr() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().to_string()
}

#[test]
fn test_refused_connection_is_fatal() {
    let config = TrackingConfig::new(unused_addr());
    let mut attempted_send = false;

    let result = TrackingClient::scoped(&config, |client| {
        attempted_send = true;
        client.send(b"never")
    });

    match result {
        Err(TrackingError::Connect { addr, .. }) => assert_eq!(addr, config.consumer_addr),
        other => panic!("expected connection error, got {:?}", other.err()),
    }
    assert!(!attempted_send);
}

#[test]
fn test_loopback_send_receive() {
    let receiver = TrackingReceiver::bind("127.0.0.1:0", 8).unwrap();
    let addr = receiver.local_addr().unwrap().to_string();

    let reader = thread::spawn(move || {
        let mut conn = receiver.accept().unwrap();
        let mut received = Vec::new();
        while let Some(msg) = conn.receive().unwrap() {
            received.push(msg);
        }
        received
    });

    let mut config = TrackingConfig::new(addr);
    config.connect_timeout_ms = Some(2000);
    config.send_timeout_ms = Some(2000);

    let sent: Vec<TrackingMessage> = (1..=5).map(|i| message(8, i)).collect();
    TrackingClient::scoped(&config, |client| {
        for msg in &sent {
            client.send_message(msg)?;
        }
        assert_eq!(client.messages_sent(), 5);
        Ok(())
    })
    .unwrap();

    let received = reader.join().unwrap();
    assert_eq!(received, sent);
}

#[test]
fn test_close_handle_fails_next_send() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    let acceptor = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let mut sink = Vec::new();
        let _ = stream.read_to_end(&mut sink);
    });

    let mut client = TrackingClient::connect(&addr).unwrap();
    client.send(b"before").unwrap();

    client.close_handle().close().unwrap();
    let err = client.send(b"after").unwrap_err();
    assert_eq!(err.category(), "io");

    drop(client);
    acceptor.join().unwrap();
}

#[test]
fn test_close_handle_interrupts_blocked_send() {
    // Peer accepts but never reads, and stays connected until released
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    let (release_tx, release_rx) = mpsc::channel::<()>();
    let acceptor = thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        let _ = release_rx.recv_timeout(Duration::from_secs(30));
        drop(stream);
    });

    let mut config = TrackingConfig::new(addr);
    config.send_timeout_ms = Some(5000);
    let mut client = TrackingClient::connect_with(&config).unwrap();

    let handle = client.close_handle();
    let closer = thread::spawn(move || {
        thread::sleep(Duration::from_millis(100));
        let closed_at = Instant::now();
        handle.close().unwrap();
        closed_at
    });

    let chunk = vec![0u8; 1 << 20];
    let mut sends = 0;
    let err = loop {
        if let Err(e) = client.send(&chunk) {
            break e;
        }
        sends += 1;
        assert!(sends < 1024, "send never blocked on an unread peer");
    };
    let failed_at = Instant::now();
    let closed_at = closer.join().unwrap();

    assert_eq!(err.category(), "io");
    assert!(failed_at >= closed_at);
    assert!(
        failed_at.duration_since(closed_at) < Duration::from_millis(500),
        "send failed {:?} after close",
        failed_at.duration_since(closed_at)
    );

    release_tx.send(()).unwrap();
    acceptor.join().unwrap();
}
