//! Async receiver integration tests

use mlc_tracking_rust::config::ReceiverConfig;
use mlc_tracking_rust::io::AsyncTrackingReceiver;
use mlc_tracking_rust::protocol::{TrackingHeader, TrackingMessage};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

fn encoded(side: usize, marker: u16) -> Vec<u8> {
    TrackingMessage {
        header: TrackingHeader {
            payload_byte_count: (side * side * 2) as u32,
            width: side as i32,
            height: side as i32,
            ..TrackingHeader::default()
        },
        pixels: vec![marker; side * side],
    }
    .encode()
}

#[tokio::test]
async fn test_async_loopback_with_split_writes() {
    let mut config = ReceiverConfig::new(16);
    config.bind_addr = "127.0.0.1:0".to_string();
    config.read_chunk_size = 100;

    let receiver = AsyncTrackingReceiver::from_config(&config).await.unwrap();
    let addr = receiver.local_addr().unwrap();

    let sender = tokio::spawn(async move {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        let mut bytes = encoded(16, 1);
        bytes.extend(encoded(16, 2));
        bytes.extend(encoded(16, 3));
        // Odd split so writes straddle message boundaries
        for part in bytes.chunks(333) {
            stream.write_all(part).await.unwrap();
        }
        stream.shutdown().await.unwrap();
    });

    let mut conn = receiver.accept().await.unwrap();
    let mut markers = Vec::new();
    while let Some(msg) = conn.receive().await.unwrap() {
        assert_eq!(msg.header.width, 16);
        markers.push(msg.pixels[0]);
    }

    sender.await.unwrap();
    assert_eq!(markers, vec![1, 2, 3]);
    assert_eq!(conn.decoded_count(), 3);
}
