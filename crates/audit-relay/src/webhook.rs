// Copyright 2025-Present Kubernetes Audit Relay Authors
// SPDX-License-Identifier: Apache-2.0

//! HTTP(S) listener for the API server's audit webhook backend.
//!
//! Only `POST <audit-serve-path>` is served. Every accepted body is forwarded before the
//! response is written, so the status code tells the API server whether the batch was
//! delivered: 200 on success, 500 otherwise.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http_body_util::{BodyExt, LengthLimitError, Limited};
use hyper::body::Body;
use hyper::header::{self, HeaderValue};
use hyper::service::service_fn;
use hyper::{http, Method, Request, StatusCode};
use hyper_util::rt::{TokioIo, TokioTimer};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::config::{ConfigError, RelayConfig};
use crate::forwarder::EventForwarder;
use crate::http_utils::{
    empty_response, log_and_create_empty_response, verify_request_content_length, HttpResponse,
};
use crate::tls::load_server_config;

const ACCEPT_BACKOFF_START: Duration = Duration::from_millis(10);
const ACCEPT_BACKOFF_MAX: Duration = Duration::from_secs(1);
const HEADER_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, thiserror::Error)]
pub enum ServeError {
    #[error("failed to listen on {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: io::Error,
    },
}

/// Routes a single request and forwards its body.
pub struct AuditHandler {
    serve_path: String,
    body_limit: Option<usize>,
    forwarder: Arc<EventForwarder>,
}

impl AuditHandler {
    pub fn new(
        serve_path: impl Into<String>,
        body_limit: Option<usize>,
        forwarder: Arc<EventForwarder>,
    ) -> Self {
        AuditHandler {
            serve_path: serve_path.into(),
            body_limit,
            forwarder,
        }
    }

    pub async fn handle<B>(&self, req: Request<B>) -> http::Result<HttpResponse>
    where
        B: Body<Data = Bytes>,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        if req.uri().path() != self.serve_path {
            debug!("No route for {} {}", req.method(), req.uri().path());
            return empty_response(StatusCode::NOT_FOUND);
        }
        if req.method() != Method::POST {
            debug!("Method {} not allowed on {}", req.method(), self.serve_path);
            let mut response = empty_response(StatusCode::METHOD_NOT_ALLOWED)?;
            response
                .headers_mut()
                .insert(header::ALLOW, HeaderValue::from_static("POST"));
            return Ok(response);
        }

        let (parts, body) = req.into_parts();
        if let Some(response) = verify_request_content_length(
            &parts.headers,
            self.body_limit,
            "Error processing audit request",
        ) {
            return response;
        }

        let limit = self.body_limit.unwrap_or(usize::MAX);
        let body = match Limited::new(body, limit).collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => {
                return log_and_create_empty_response(
                    &format!("Error processing audit request: Payload exceeds the {limit} byte limit"),
                    StatusCode::PAYLOAD_TOO_LARGE,
                );
            }
            Err(e) => {
                return log_and_create_empty_response(
                    &format!("Error reading audit request body: {e}"),
                    StatusCode::BAD_REQUEST,
                );
            }
        };

        debug!(request = %String::from_utf8_lossy(&body), "Received audit payload");

        match self.forwarder.forward(body).await {
            Ok(()) => empty_response(StatusCode::OK),
            // the forwarder already logged the cause
            Err(_) => empty_response(StatusCode::INTERNAL_SERVER_ERROR),
        }
    }
}

pub struct WebhookServer {
    listen_address: String,
    handler: Arc<AuditHandler>,
    tls: Option<TlsAcceptor>,
    header_timeout: Duration,
}

impl WebhookServer {
    /// Loads the listener certificate (when configured) so TLS problems surface before binding.
    pub fn new(config: &RelayConfig, forwarder: Arc<EventForwarder>) -> Result<Self, ConfigError> {
        let tls = match config.webhook_tls_files() {
            Some((cert, key)) => Some(TlsAcceptor::from(load_server_config(cert, key)?)),
            None => None,
        };
        let handler = AuditHandler::new(
            config.audit_serve_path.clone(),
            config.body_limit(),
            forwarder,
        );
        Ok(WebhookServer {
            listen_address: config.listen_address(),
            handler: Arc::new(handler),
            tls,
            header_timeout: HEADER_TIMEOUT,
        })
    }

    /// Bounds the TLS handshake and the read of each request's headers. Defaults to 30s.
    #[must_use]
    pub fn with_header_timeout(mut self, timeout: Duration) -> Self {
        self.header_timeout = timeout;
        self
    }

    pub fn listen_address(&self) -> &str {
        &self.listen_address
    }

    pub fn is_tls(&self) -> bool {
        self.tls.is_some()
    }

    pub async fn bind(&self) -> Result<TcpListener, ServeError> {
        TcpListener::bind(&self.listen_address)
            .await
            .map_err(|source| ServeError::Bind {
                address: self.listen_address.clone(),
                source,
            })
    }

    /// Accepts connections until `shutdown` is cancelled. Connections still open at that
    /// point are dropped; the API server retries batches it got no response for.
    ///
    /// Accept errors never stop the server. Running out of file descriptors resolves itself
    /// as open connections finish, so the loop backs off and tries again.
    pub async fn serve(&self, listener: TcpListener, shutdown: CancellationToken) {
        let mut joinset = tokio::task::JoinSet::new();
        let mut accept_failures = 0u32;

        loop {
            let (conn, peer) = tokio::select! {
                con_res = listener.accept() => match con_res {
                    Ok(accepted) => {
                        accept_failures = 0;
                        accepted
                    }
                    Err(e)
                        if matches!(
                            e.kind(),
                            io::ErrorKind::ConnectionAborted
                                | io::ErrorKind::ConnectionReset
                                | io::ErrorKind::ConnectionRefused
                        ) =>
                    {
                        continue;
                    }
                    Err(e) => {
                        accept_failures = accept_failures.saturating_add(1);
                        let delay = accept_backoff(accept_failures);
                        error!(
                            "Failed to accept connection ({} open): {e}, retrying in {delay:?}",
                            joinset.len()
                        );
                        tokio::select! {
                            () = tokio::time::sleep(delay) => continue,
                            () = shutdown.cancelled() => {
                                joinset.shutdown().await;
                                return;
                            },
                        }
                    }
                },
                finished = async {
                    match joinset.join_next().await {
                        Some(finished) => finished,
                        None => std::future::pending().await,
                    }
                } => match finished {
                    Err(e) if e.is_panic() => {
                        // Don't kill server on panic - log and continue
                        error!("Connection handler panicked: {:?}", e);
                        continue;
                    },
                    Ok(()) | Err(_) => continue,
                },
                () = shutdown.cancelled() => {
                    debug!("Shutting down, dropping {} open connections", joinset.len());
                    joinset.shutdown().await;
                    return;
                },
            };

            let handler = self.handler.clone();
            let header_timeout = self.header_timeout;
            match self.tls.clone() {
                Some(acceptor) => {
                    joinset.spawn(async move {
                        match tokio::time::timeout(header_timeout, acceptor.accept(conn)).await {
                            Ok(Ok(stream)) => {
                                serve_connection(stream, handler, header_timeout).await;
                            }
                            Ok(Err(e)) => warn!("TLS handshake with {peer} failed: {e}"),
                            Err(_) => warn!("TLS handshake with {peer} timed out"),
                        }
                    });
                }
                None => {
                    joinset.spawn(serve_connection(conn, handler, header_timeout));
                }
            }
        }
    }
}

/// Delay before the next `accept` after `failures` consecutive errors.
fn accept_backoff(failures: u32) -> Duration {
    ACCEPT_BACKOFF_START
        .saturating_mul(2u32.saturating_pow(failures.saturating_sub(1)))
        .min(ACCEPT_BACKOFF_MAX)
}

async fn serve_connection<I>(io: I, handler: Arc<AuditHandler>, header_timeout: Duration)
where
    I: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let service = service_fn(move |req| {
        let handler = handler.clone();
        async move { handler.handle(req).await }
    });
    if let Err(e) = hyper::server::conn::http1::Builder::new()
        .timer(TokioTimer::new())
        .header_read_timeout(header_timeout)
        .serve_connection(TokioIo::new(io), service)
        .await
    {
        if e.is_timeout() {
            debug!("Closing connection: {e}");
        } else {
            error!("Connection error: {e}");
        }
    }
}
