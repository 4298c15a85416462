use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::integration::{init_tracing, start_relay};

#[tokio::test]
async fn test_generate_room_returns_fresh_id() {
    init_tracing();
    let addr = start_relay().await;

    let mut stream = TcpStream::connect(addr).await.expect("connect");
    stream
        .write_all(b"GET /generate-room HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
        .await
        .expect("write request");

    let mut response = String::new();
    stream
        .read_to_string(&mut response)
        .await
        .expect("read response");

    assert!(response.starts_with("HTTP/1.1 200"), "{response}");
    assert!(response.contains("\"roomId\":\"room_"), "{response}");
}
