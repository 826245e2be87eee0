// Copyright 2025-Present Kubernetes Audit Relay Authors
// SPDX-License-Identifier: Apache-2.0

//! Helper functions for integration tests

use audit_relay::config::RelayConfig;
use audit_relay::envelope::EnvelopeTemplate;
use audit_relay::forwarder::EventForwarder;
use audit_relay::sink::Sink;
use audit_relay::webhook::WebhookServer;
use bytes::Bytes;
use http_body_util::Full;
use hyper::{Request, Response};
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

/// A listener running in the background on a random port
pub struct RunningRelay {
    pub addr: SocketAddr,
    pub shutdown: CancellationToken,
    pub handle: JoinHandle<()>,
}

impl RunningRelay {
    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Cancel the listener and wait for `serve` to return
    #[allow(dead_code)]
    pub async fn stop(self) {
        self.shutdown.cancel();
        timeout(Duration::from_secs(2), self.handle)
            .await
            .expect("listener did not stop in time")
            .expect("listener task panicked");
    }
}

/// Listener config bound to an ephemeral port on localhost
pub fn test_config() -> RelayConfig {
    RelayConfig {
        port: 0,
        ..Default::default()
    }
}

#[allow(dead_code)]
pub fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

/// Build a listener in front of the given sink without starting it
pub fn relay_server(config: &RelayConfig, sink: Arc<dyn Sink>) -> WebhookServer {
    let forwarder = Arc::new(EventForwarder::new(
        EnvelopeTemplate::from_config(config),
        sink,
    ));
    WebhookServer::new(config, forwarder).expect("Failed to create listener")
}

/// Start a listener in front of the given sink
pub async fn start_relay(config: RelayConfig, sink: Arc<dyn Sink>) -> RunningRelay {
    start_server(relay_server(&config, sink)).await
}

/// Bind and serve in the background
pub async fn start_server(server: WebhookServer) -> RunningRelay {
    let listener = server.bind().await.expect("Failed to bind listener");
    let addr = listener.local_addr().expect("Failed to get local addr");

    let shutdown = CancellationToken::new();
    let token = shutdown.clone();
    let handle = tokio::spawn(async move { server.serve(listener, token).await });

    RunningRelay {
        addr,
        shutdown,
        handle,
    }
}

/// Send an HTTP request over TCP and return the response
pub async fn send_tcp_request(
    port: u16,
    uri: &str,
    method: &str,
    body: Option<Vec<u8>>,
) -> Result<Response<hyper::body::Incoming>, Box<dyn std::error::Error + Send + Sync>> {
    let stream = timeout(
        Duration::from_secs(2),
        tokio::net::TcpStream::connect(format!("127.0.0.1:{}", port)),
    )
    .await??;

    let io = TokioIo::new(stream);
    let (mut sender, conn) = hyper::client::conn::http1::handshake(io).await?;

    tokio::spawn(async move {
        let _ = conn.await;
    });

    let mut request_builder = Request::builder()
        .uri(uri)
        .method(method)
        .header("Host", format!("127.0.0.1:{port}"))
        .header("Content-Type", "application/json");

    let request = if let Some(body_data) = body {
        let body_len = body_data.len();
        request_builder = request_builder.header("Content-Length", body_len.to_string());
        request_builder.body(Full::new(Bytes::from(body_data)))?
    } else {
        request_builder.body(Full::new(Bytes::new()))?
    };

    let response = timeout(Duration::from_secs(5), sender.send_request(request)).await??;
    Ok(response)
}

/// Write a raw HTTP/1.1 request and return the status code of the response
#[allow(dead_code)]
pub async fn send_raw_request(
    port: u16,
    raw: &[u8],
) -> Result<u16, Box<dyn std::error::Error + Send + Sync>> {
    let mut stream = tokio::net::TcpStream::connect(format!("127.0.0.1:{}", port)).await?;
    stream.write_all(raw).await?;

    let mut status_line = String::new();
    timeout(
        Duration::from_secs(5),
        BufReader::new(stream).read_line(&mut status_line),
    )
    .await??;

    // HTTP/1.1 413 Payload Too Large
    let code = status_line
        .split_whitespace()
        .nth(1)
        .ok_or("empty response")?
        .parse::<u16>()?;
    Ok(code)
}
