//! HTTP endpoint checking.
//!
//! One GET with a short timeout per endpoint per tick. Success is a 2xx
//! status, uniformly for every endpoint kind; the response body is never
//! read - for an event-stream endpoint the body does not end, and the 2xx
//! response headers already are the "stream opened" signal.

use crate::{EndpointChecker, EndpointSpec, ProbeCheckData};
use async_trait::async_trait;
use http_body_util::Empty;
use hyper::body::Bytes;
use hyper::{Method, Request, Uri};
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::debug;

/// Endpoint checker that performs real loopback HTTP requests.
#[derive(Debug, Clone, Default)]
pub struct HttpEndpointChecker;

impl HttpEndpointChecker {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl EndpointChecker for HttpEndpointChecker {
    async fn check(&self, endpoint: &EndpointSpec, request_timeout: Duration) -> ProbeCheckData {
        let start = Instant::now();

        let uri: Uri = match endpoint.url.parse() {
            Ok(uri) => uri,
            Err(e) => {
                return ProbeCheckData::failure(start.elapsed(), format!("invalid URI: {}", e));
            }
        };

        let client = Client::builder(TokioExecutor::new()).build_http();

        let request = match Request::builder()
            .method(Method::GET)
            .uri(uri)
            .header("User-Agent", "journal-supervisor/1.0")
            .header("Accept", endpoint.expect.accept_header())
            .body(Empty::<Bytes>::new())
        {
            Ok(request) => request,
            Err(e) => {
                return ProbeCheckData::failure(
                    start.elapsed(),
                    format!("failed to build request: {}", e),
                );
            }
        };

        match timeout(request_timeout, client.request(request)).await {
            Ok(Ok(response)) => {
                let status = response.status();
                let latency = start.elapsed();
                debug!(endpoint = %endpoint.url, %status, ?latency, "endpoint answered");
                if status.is_success() {
                    ProbeCheckData::success(latency)
                } else {
                    ProbeCheckData::failure(latency, format!("unexpected status: {}", status))
                }
            }
            Ok(Err(e)) => {
                ProbeCheckData::failure(start.elapsed(), format!("connection failed: {}", e))
            }
            Err(_) => ProbeCheckData::failure(request_timeout, "timeout"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Minimal loopback responder answering every connection with a fixed
    /// status line.
    async fn serve_fixed(response: &'static str) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    break;
                };
                tokio::spawn(async move {
                    let mut buf = [0u8; 1024];
                    let _ = socket.read(&mut buf).await;
                    let _ = socket.write_all(response.as_bytes()).await;
                    let _ = socket.shutdown().await;
                });
            }
        });
        addr
    }

    #[test]
    fn test_accept_headers() {
        use crate::ResponseKind;
        assert_eq!(ResponseKind::Json.accept_header(), "application/json");
        assert_eq!(
            ResponseKind::EventStream.accept_header(),
            "text/event-stream"
        );
    }

    #[tokio::test]
    async fn test_invalid_url_fails() {
        let checker = HttpEndpointChecker::new();
        let data = checker
            .check(&EndpointSpec::json("not a url"), Duration::from_secs(1))
            .await;
        assert!(!data.ok);
        assert!(data.error.unwrap().contains("invalid URI"));
    }

    #[tokio::test]
    async fn test_2xx_is_ready() {
        let addr =
            serve_fixed("HTTP/1.1 200 OK\r\ncontent-length: 0\r\nconnection: close\r\n\r\n").await;
        let checker = HttpEndpointChecker::new();
        let data = checker
            .check(
                &EndpointSpec::json(format!("http://{}/", addr)),
                Duration::from_secs(2),
            )
            .await;
        assert!(data.ok, "expected success, got {:?}", data.error);
    }

    #[tokio::test]
    async fn test_5xx_is_not_ready() {
        let addr = serve_fixed(
            "HTTP/1.1 503 Service Unavailable\r\ncontent-length: 0\r\nconnection: close\r\n\r\n",
        )
        .await;
        let checker = HttpEndpointChecker::new();
        let data = checker
            .check(
                &EndpointSpec::json(format!("http://{}/", addr)),
                Duration::from_secs(2),
            )
            .await;
        assert!(!data.ok);
        assert!(data.error.unwrap().contains("503"));
    }

    #[tokio::test]
    async fn test_connection_refused_is_not_ready() {
        // Bind-then-drop to get a port that refuses connections.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let checker = HttpEndpointChecker::new();
        let data = checker
            .check(
                &EndpointSpec::json(format!("http://{}/", addr)),
                Duration::from_secs(2),
            )
            .await;
        assert!(!data.ok);
    }
}
