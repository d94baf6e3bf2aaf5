use attack_engine::{DispatchError, HttpRequestData, ReqwestDispatcher, RequestDispatcher};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::oneshot;

/// Serve one canned response and hand back the raw request head and body
async fn serve_once(response: &'static [u8]) -> (String, oneshot::Receiver<(String, String)>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = oneshot::channel();

    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut buf = Vec::new();
        let mut chunk = [0u8; 1024];

        let head_end = loop {
            let n = socket.read(&mut chunk).await.unwrap();
            buf.extend_from_slice(&chunk[..n]);
            if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                break pos + 4;
            }
        };
        let head = String::from_utf8_lossy(&buf[..head_end]).to_string();
        let content_length = head
            .lines()
            .find_map(|line| {
                let (name, value) = line.split_once(':')?;
                name.eq_ignore_ascii_case("content-length")
                    .then(|| value.trim().parse::<usize>().ok())
                    .flatten()
            })
            .unwrap_or(0);
        while buf.len() < head_end + content_length {
            let n = socket.read(&mut chunk).await.unwrap();
            buf.extend_from_slice(&chunk[..n]);
        }
        let body = String::from_utf8_lossy(&buf[head_end..head_end + content_length]).to_string();

        socket.write_all(response).await.unwrap();
        socket.shutdown().await.unwrap();
        let _ = tx.send((head, body));
    });

    (format!("http://{}", addr), rx)
}

#[tokio::test]
async fn test_dispatch_returns_structured_response() {
    let (base, seen) = serve_once(
        b"HTTP/1.1 201 Created\r\nX-Trace: abc\r\nContent-Length: 5\r\nConnection: close\r\n\r\nhello",
    )
    .await;
    let dispatcher = ReqwestDispatcher::new(Duration::from_secs(5)).unwrap();

    let mut request = HttpRequestData::new("POST", format!("{}/submit", base));
    request.headers.append("X-Token", "t1");
    request.headers.append("Content-Length", "999");
    request.body = "a=1".to_string();

    let response = dispatcher.dispatch(request).await.unwrap();
    assert_eq!(response.status_code, 201);
    assert_eq!(response.reason.as_deref(), Some("Created"));
    assert_eq!(response.headers.get("x-trace"), Some("abc"));
    assert_eq!(response.body, "hello");

    let (head, body) = seen.await.unwrap();
    assert!(head.starts_with("POST /submit HTTP/1.1"));
    assert!(head.to_ascii_lowercase().contains("x-token: t1"));
    // Stale length from the template is replaced by the real one
    assert!(head.to_ascii_lowercase().contains("content-length: 3"));
    assert_eq!(body, "a=1");
}

#[tokio::test]
async fn test_binary_body_length_is_byte_count() {
    let (base, _seen) = serve_once(
        b"HTTP/1.1 200 OK\r\nContent-Type: application/octet-stream\r\nContent-Length: 4\r\nConnection: close\r\n\r\n\xff\xfe\x00\x80",
    )
    .await;
    let dispatcher = ReqwestDispatcher::new(Duration::from_secs(5)).unwrap();

    let response = dispatcher
        .dispatch(HttpRequestData::new("GET", format!("{}/blob", base)))
        .await
        .unwrap();
    assert_eq!(response.body_length(), 4);
    assert!(response.body.contains('\u{fffd}'));
}

#[tokio::test]
async fn test_declared_charset_does_not_change_length() {
    // "café" in latin-1 is four bytes on the wire
    let (base, _seen) = serve_once(
        b"HTTP/1.1 200 OK\r\nContent-Type: text/plain; charset=iso-8859-1\r\nContent-Length: 4\r\nConnection: close\r\n\r\ncaf\xe9",
    )
    .await;
    let dispatcher = ReqwestDispatcher::new(Duration::from_secs(5)).unwrap();

    let response = dispatcher
        .dispatch(HttpRequestData::new("GET", format!("{}/text", base)))
        .await
        .unwrap();
    assert_eq!(response.body_length(), 4);
    assert!(response.body.starts_with("caf"));
}

#[tokio::test]
async fn test_redirects_are_not_followed() {
    let (base, _seen) = serve_once(
        b"HTTP/1.1 302 Found\r\nLocation: /elsewhere\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
    )
    .await;
    let dispatcher = ReqwestDispatcher::new(Duration::from_secs(5)).unwrap();

    let response = dispatcher
        .dispatch(HttpRequestData::new("GET", format!("{}/start", base)))
        .await
        .unwrap();
    assert_eq!(response.status_code, 302);
    assert_eq!(response.headers.get("Location"), Some("/elsewhere"));
}

#[tokio::test]
async fn test_connection_refused_is_transport_error() {
    // Bind then drop to get a port nothing listens on
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    };
    let dispatcher = ReqwestDispatcher::new(Duration::from_secs(5)).unwrap();

    let err = dispatcher
        .dispatch(HttpRequestData::new("GET", format!("http://127.0.0.1:{}/", port)))
        .await
        .unwrap_err();
    assert!(matches!(err, DispatchError::Transport { .. }));
}

#[tokio::test]
async fn test_invalid_method_is_rejected_before_sending() {
    let dispatcher = ReqwestDispatcher::new(Duration::from_secs(5)).unwrap();
    let err = dispatcher
        .dispatch(HttpRequestData::new("BAD METHOD", "http://127.0.0.1:1/"))
        .await
        .unwrap_err();
    assert!(matches!(err, DispatchError::InvalidRequest { .. }));
}
