//! Shared utilities for integration and load testing.
#![allow(dead_code)]

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::Response;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use edge_router::manifest::{BuildOutput, RoutesManifest};
use edge_router::runtime::{EdgeFetch, FunctionRegistry, MemoryCacheStore};
use edge_router::serve::{AssetFetcher, MemoryAssets};
use edge_router::{Deployment, RuntimeEnv};

/// Build a deployment from routes manifest and build output JSON.
pub fn deployment(manifest: &str, output: &str) -> Deployment {
    let manifest: RoutesManifest = serde_json::from_str(manifest).unwrap();
    let output: BuildOutput = serde_json::from_str(output).unwrap();
    Deployment::new(manifest, output)
}

/// Runtime environment with the given handlers and assets, plus an
/// in-memory suspense cache.
pub fn env_with(functions: FunctionRegistry, assets: impl AssetFetcher + 'static) -> Arc<RuntimeEnv> {
    let fetch = EdgeFetch::new(reqwest::Client::new()).with_cache(Arc::new(MemoryCacheStore::new()));
    Arc::new(RuntimeEnv::new(functions, Arc::new(assets), fetch))
}

pub fn env() -> Arc<RuntimeEnv> {
    env_with(FunctionRegistry::new(), MemoryAssets::new())
}

pub async fn body_string(response: Response<Body>) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

/// An address nothing is listening on.
pub async fn closed_port() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

/// Start a simple mock upstream that returns a fixed response.
pub async fn start_mock_backend(response: &'static str) -> SocketAddr {
    start_programmable_backend(move || async move { (200, response.to_string()) }).await
}

/// Start a programmable mock upstream with async support.
pub async fn start_programmable_backend<F, Fut>(f: F) -> SocketAddr
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = (u16, String)> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let f = Arc::new(f);

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    let f = f.clone();
                    tokio::spawn(async move {
                        read_request_head(&mut socket).await;
                        let (status, body) = f().await;
                        let status_text = match status {
                            200 => "200 OK",
                            404 => "404 Not Found",
                            500 => "500 Internal Server Error",
                            502 => "502 Bad Gateway",
                            503 => "503 Service Unavailable",
                            _ => "200 OK",
                        };

                        let response_str = format!(
                            "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            status_text,
                            body.len(),
                            body
                        );
                        let _ = socket.write_all(response_str.as_bytes()).await;
                        let _ = socket.shutdown().await;
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    addr
}

/// Consume the request line and headers; test requests carry no body.
async fn read_request_head(socket: &mut TcpStream) {
    let mut head = Vec::new();
    let mut buf = [0u8; 1024];
    while !head.windows(4).any(|w| w == b"\r\n\r\n") {
        match socket.read(&mut buf).await {
            Ok(0) | Err(_) => return,
            Ok(n) => head.extend_from_slice(&buf[..n]),
        }
    }
}
