// Copyright 2025-Present Kubernetes Audit Relay Authors
// SPDX-License-Identifier: Apache-2.0

//! Simple mock event collector for end-to-end tests

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::{body::Incoming, Request, Response};
use hyper_util::rt::TokioIo;
use rustls::server::WebPkiClientVerifier;
use rustls::{RootCertStore, ServerConfig};
use rustls_pki_types::pem::PemObject;
use rustls_pki_types::{CertificateDer, PrivateKeyDer};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;

#[derive(Clone, Debug)]
pub struct ReceivedRequest {
    pub method: String,
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

#[allow(dead_code)]
impl ReceivedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).expect("collector received invalid JSON")
    }
}

#[derive(Clone)]
pub struct MockServer {
    pub addr: SocketAddr,
    pub received_requests: Arc<Mutex<Vec<ReceivedRequest>>>,
    tls: bool,
}

#[allow(dead_code)]
impl MockServer {
    /// Start a mock collector on a random port that answers 200 to everything
    pub async fn start() -> Self {
        Self::start_with_status(200).await
    }

    /// Start a mock collector on a random port that answers with the given status
    pub async fn start_with_status(status: u16) -> Self {
        Self::spawn(status, None).await
    }

    /// Start an HTTPS mock collector that only completes handshakes with clients presenting
    /// a certificate signed by `client_ca`
    pub async fn start_requiring_client_cert(cert: &Path, key: &Path, client_ca: &Path) -> Self {
        let provider = Arc::new(rustls::crypto::ring::default_provider());

        let mut roots = RootCertStore::empty();
        for ca in CertificateDer::pem_file_iter(client_ca).expect("Failed to read client CA") {
            roots.add(ca.expect("Invalid client CA")).expect("Failed to add client CA");
        }
        let verifier = WebPkiClientVerifier::builder_with_provider(Arc::new(roots), provider.clone())
            .build()
            .expect("Failed to build client verifier");

        let certs = CertificateDer::pem_file_iter(cert)
            .expect("Failed to read server certificate")
            .collect::<Result<Vec<_>, _>>()
            .expect("Invalid server certificate");
        let key = PrivateKeyDer::from_pem_file(key).expect("Failed to read server key");
        let mut config = ServerConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()
            .expect("Failed to select protocol versions")
            .with_client_cert_verifier(verifier)
            .with_single_cert(certs, key)
            .expect("Failed to build server config");
        config.alpn_protocols = vec![b"http/1.1".to_vec()];

        Self::spawn(200, Some(TlsAcceptor::from(Arc::new(config)))).await
    }

    async fn spawn(status: u16, tls: Option<TlsAcceptor>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind mock server");
        let addr = listener.local_addr().expect("Failed to get local addr");

        let received_requests = Arc::new(Mutex::new(Vec::new()));
        let requests_clone = received_requests.clone();
        let is_tls = tls.is_some();

        tokio::spawn(async move {
            loop {
                let (stream, _) = match listener.accept().await {
                    Ok(conn) => conn,
                    Err(_) => break,
                };

                let requests = requests_clone.clone();
                let tls = tls.clone();

                tokio::spawn(async move {
                    match tls {
                        Some(acceptor) => {
                            // rejected client certificates end here
                            if let Ok(stream) = acceptor.accept(stream).await {
                                serve_connection(stream, requests, status).await;
                            }
                        }
                        None => serve_connection(stream, requests, status).await,
                    }
                });
            }
        });

        MockServer {
            addr,
            received_requests,
            tls: is_tls,
        }
    }

    /// Get the base URL of the mock server
    pub fn url(&self) -> String {
        let scheme = if self.tls { "https" } else { "http" };
        format!("{scheme}://{}", self.addr)
    }

    /// Get all received requests
    pub fn get_requests(&self) -> Vec<ReceivedRequest> {
        self.received_requests.lock().unwrap().clone()
    }

    /// Get requests matching a path
    pub fn get_requests_for_path(&self, path: &str) -> Vec<ReceivedRequest> {
        self.received_requests
            .lock()
            .unwrap()
            .iter()
            .filter(|req| req.path == path)
            .cloned()
            .collect()
    }
}

async fn serve_connection<I>(io: I, requests: Arc<Mutex<Vec<ReceivedRequest>>>, status: u16)
where
    I: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let service = hyper::service::service_fn(move |req: Request<Incoming>| {
        let requests = requests.clone();
        async move {
            let method = req.method().to_string();
            let path = req.uri().path().to_string();
            let headers: Vec<(String, String)> = req
                .headers()
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_str().unwrap_or("").to_string()))
                .collect();

            let body_bytes = req
                .into_body()
                .collect()
                .await
                .map(|collected| collected.to_bytes().to_vec())
                .unwrap_or_default();

            requests.lock().unwrap().push(ReceivedRequest {
                method,
                path,
                headers,
                body: body_bytes,
            });

            let reply = if (200..300).contains(&status) {
                r#"{"text":"Success","code":0}"#
            } else {
                r#"{"text":"Server is busy","code":9}"#
            };
            Response::builder()
                .status(status)
                .header("Content-Type", "application/json")
                .body(Full::new(Bytes::from_static(reply.as_bytes())))
        }
    });

    let _ = hyper::server::conn::http1::Builder::new()
        .serve_connection(TokioIo::new(io), service)
        .await;
}
