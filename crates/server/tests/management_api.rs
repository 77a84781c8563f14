//! Management API over a real socket

mod common;

use std::net::SocketAddr;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

use common::{connect, read_to_close, TestServer};

const ACME: &[u8] = b"acme-tls/1";

async fn request(addr: SocketAddr, method: &str, path: &str, body: &str) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let request = format!(
        "{method} {path} HTTP/1.1\r\nHost: localhost\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n{body}",
        body.len()
    );
    stream.write_all(request.as_bytes()).await.unwrap();

    String::from_utf8_lossy(&read_to_close(&mut stream).await).into_owned()
}

fn status_line(response: &str) -> &str {
    response.lines().next().unwrap_or_default()
}

#[tokio::test]
async fn test_add_then_handshake_then_delete() {
    let server = TestServer::start().await;
    let management = server.management_addr.unwrap();

    let response = request(
        management,
        "POST",
        "/add-tlsalpn01",
        r#"{"host":"example.test","content":"token123.thumb"}"#,
    )
    .await;
    assert_eq!(status_line(&response), "HTTP/1.1 200 OK");
    assert_eq!(
        server.server.get_tls_alpn_challenge("example.test"),
        Some("token123.thumb".to_string())
    );

    let stream = connect(server.tls_addr, "example.test", &[ACME]).await;
    assert!(stream.is_ok());
    drop(stream);

    let response = request(
        management,
        "POST",
        "/del-tlsalpn01",
        r#"{"host":"example.test"}"#,
    )
    .await;
    assert_eq!(status_line(&response), "HTTP/1.1 200 OK");
    assert!(connect(server.tls_addr, "example.test", &[ACME]).await.is_err());

    server.stop().await;
}

#[tokio::test]
async fn test_error_statuses() {
    let server = TestServer::start().await;
    let management = server.management_addr.unwrap();

    let bad_body = request(management, "POST", "/add-tlsalpn01", "{").await;
    assert_eq!(status_line(&bad_body), "HTTP/1.1 400 Bad Request");

    let unknown = request(management, "POST", "/set-default-ipv4", "{}").await;
    assert_eq!(status_line(&unknown), "HTTP/1.1 404 Not Found");

    let wrong_method = request(management, "GET", "/add-tlsalpn01", "").await;
    assert_eq!(status_line(&wrong_method), "HTTP/1.1 405 Method Not Allowed");

    assert!(server.server.registry().is_empty());
    server.stop().await;
}
