//! `HttpSource` against a throwaway local HTTP server.

mod common;

use std::time::Duration;

use futures::StreamExt;
use s3relay::relay::{relay, RelayError, RelayRequest};
use s3relay::source::{ChunkSource, HttpSource};
use s3relay::storage::BackendCall;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use common::{as_dyn, backend, BUCKET, KEY, MIB};

/// Serve one connection with `head` followed by `body`, then close.
async fn serve_once(head: String, body: Vec<u8>) -> String {
    serve(head, body, None).await
}

/// Serve one connection with `head` followed by `body`, then keep the
/// connection open without sending anything for `stall`.
async fn serve_stalled(head: String, body: Vec<u8>, stall: Duration) -> String {
    serve(head, body, Some(stall)).await
}

async fn serve(head: String, body: Vec<u8>, stall: Option<Duration>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut request = Vec::new();
        let mut buf = [0u8; 1024];
        while !request.windows(4).any(|w| w == b"\r\n\r\n") {
            let n = socket.read(&mut buf).await.unwrap();
            if n == 0 {
                return;
            }
            request.extend_from_slice(&buf[..n]);
        }
        socket.write_all(head.as_bytes()).await.unwrap();
        socket.write_all(&body).await.unwrap();
        socket.flush().await.unwrap();
        if let Some(stall) = stall {
            tokio::time::sleep(stall).await;
        }
        let _ = socket.shutdown().await;
    });

    format!("http://{}/data.csv", addr)
}

fn ok_head(content_length: usize) -> String {
    format!(
        "HTTP/1.1 200 OK\r\nContent-Type: text/csv\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        content_length
    )
}

#[tokio::test]
async fn test_streams_body_in_bounded_chunks() {
    let body: Vec<u8> = (0..10_000u32).map(|i| (i % 256) as u8).collect();
    let url = serve_once(ok_head(body.len()), body.clone()).await;
    let source = HttpSource::new(1024).unwrap();

    let mut chunks = source.open(&url).await.unwrap();
    let mut received = Vec::new();
    while let Some(chunk) = chunks.next().await {
        let chunk = chunk.unwrap();
        assert!(!chunk.is_empty() && chunk.len() <= 1024);
        received.extend_from_slice(&chunk);
    }

    assert_eq!(received, body);
}

#[tokio::test]
async fn test_non_success_status_is_unavailable() {
    let head = "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n";
    let url = serve_once(head.to_string(), Vec::new()).await;
    let source = HttpSource::new(1024).unwrap();

    match source.open(&url).await {
        Err(RelayError::SourceUnavailable { reason, .. }) => assert!(reason.contains("404")),
        Err(other) => panic!("expected SourceUnavailable, got {:?}", other),
        Ok(_) => panic!("expected SourceUnavailable, got a stream"),
    }
}

#[tokio::test]
async fn test_short_body_is_interrupted() {
    let url = serve_once(ok_head(4096), vec![b'x'; 1000]).await;
    let source = HttpSource::new(256).unwrap();

    let mut chunks = source.open(&url).await.unwrap();
    let mut read = 0;
    let mut failure = None;
    while let Some(chunk) = chunks.next().await {
        match chunk {
            Ok(chunk) => read += chunk.len(),
            Err(e) => failure = Some(e),
        }
    }

    assert_eq!(read, 1000);
    match failure {
        Some(RelayError::TransferInterrupted { bytes_read, .. }) => assert_eq!(bytes_read, 1000),
        other => panic!("expected TransferInterrupted, got {:?}", other),
    }
}

#[tokio::test]
async fn test_refused_connection_is_unavailable() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let source = HttpSource::with_timeout(1024, Duration::from_secs(2)).unwrap();
    let err = source
        .open(&format!("http://{}/missing.csv", addr))
        .await
        .err()
        .unwrap();

    assert!(matches!(err, RelayError::SourceUnavailable { .. }));
    assert_eq!(err.user_message(), "Failed to download the file");
}

#[tokio::test]
async fn test_stalled_body_times_out_as_interrupted() {
    let url = serve_stalled(ok_head(4096), vec![b'x'; 100], Duration::from_secs(30)).await;
    let source = HttpSource::with_timeout(256, Duration::from_secs(1)).unwrap();

    let mut chunks = source.open(&url).await.unwrap();
    let mut items = Vec::new();
    let drained = tokio::time::timeout(Duration::from_secs(10), async {
        while let Some(item) = chunks.next().await {
            items.push(item);
        }
    })
    .await;

    assert!(drained.is_ok(), "stream did not end after the read timeout");
    match items.last() {
        Some(Err(RelayError::TransferInterrupted { bytes_read, .. })) => {
            assert_eq!(*bytes_read, 100)
        }
        other => panic!("expected TransferInterrupted, got {:?}", other),
    }
}

#[tokio::test]
async fn test_stalled_source_aborts_the_upload() {
    let url = serve_stalled(ok_head(4096), vec![b'x'; 100], Duration::from_secs(30)).await;
    let source = HttpSource::with_timeout(256, Duration::from_secs(1)).unwrap();
    let backend = backend();
    let request = RelayRequest {
        url,
        bucket: BUCKET.to_string(),
        key: KEY.to_string(),
        part_size: 5 * MIB,
        max_part_attempts: 1,
    };

    let outcome = tokio::time::timeout(
        Duration::from_secs(10),
        relay(&source, as_dyn(&backend), &request),
    )
    .await
    .expect("relay hung on a stalled source");

    let err = outcome.unwrap_err();
    assert!(matches!(err, RelayError::TransferInterrupted { .. }));
    assert_eq!(backend.open_uploads(), 0);
    assert!(!backend
        .calls()
        .iter()
        .any(|call| matches!(call, BackendCall::CompleteMultipart { .. })));
}
