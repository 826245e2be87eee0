// Copyright 2025-Present Kubernetes Audit Relay Authors
// SPDX-License-Identifier: Apache-2.0

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Url;
use serde::Deserialize;
use tracing::{debug, error};

use crate::config::{ConfigError, RelayConfig};
use crate::envelope::Envelope;
use crate::http_utils::build_client;
use crate::sink::{Sink, SinkError};
use crate::tls::load_client_identity;

const EVENT_ENDPOINT_PATH: &str = "services/collector/event";
const CHANNEL_HEADER: &str = "x-splunk-request-channel";

/// Reply body returned by the collector, e.g. `{"text":"Invalid token","code":4}`.
#[derive(Debug, Deserialize)]
struct CollectorReply {
    text: String,
    #[serde(default)]
    code: Option<i64>,
}

/// Submits envelopes to an HTTP Event Collector cluster.
///
/// Requests rotate across the configured base URLs. Every envelope gets exactly one
/// attempt against one URL: a failing endpoint is reported, not skipped.
pub struct HecSink {
    client: reqwest::Client,
    endpoints: Vec<Url>,
    headers: HeaderMap,
    next: AtomicUsize,
}

impl HecSink {
    pub fn new(
        client: reqwest::Client,
        server_urls: &[String],
        token: &str,
    ) -> Result<Self, ConfigError> {
        if server_urls.is_empty() {
            return Err(ConfigError::Missing("server-urls"));
        }
        let endpoints = server_urls
            .iter()
            .map(|url| event_endpoint(url))
            .collect::<Result<Vec<_>, _>>()?;

        let mut authorization =
            HeaderValue::from_str(&format!("Splunk {}", token.trim())).map_err(|_| {
                ConfigError::Invalid {
                    field: "token",
                    reason: "contains characters not allowed in a header".to_string(),
                }
            })?;
        authorization.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, authorization);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        // one channel per process, the collector uses it to group acknowledgements
        let channel = HeaderValue::from_str(&uuid::Uuid::new_v4().to_string()).map_err(|e| {
            ConfigError::Invalid {
                field: CHANNEL_HEADER,
                reason: e.to_string(),
            }
        })?;
        headers.insert(CHANNEL_HEADER, channel);

        Ok(HecSink {
            client,
            endpoints,
            headers,
            next: AtomicUsize::new(0),
        })
    }

    pub fn from_config(config: &RelayConfig) -> Result<Self, ConfigError> {
        let identity = match config.client_tls_files() {
            Some((cert, key)) => Some(load_client_identity(cert, key)?),
            None => None,
        };
        let client = build_client(config.request_timeout(), config.insecure_cert, identity)?;
        let token = config.token.as_deref().ok_or(ConfigError::Missing("token"))?;
        HecSink::new(client, &config.server_urls, token)
    }

    pub fn endpoints(&self) -> &[Url] {
        &self.endpoints
    }

    fn next_endpoint(&self) -> &Url {
        let index = self.next.fetch_add(1, Ordering::Relaxed) % self.endpoints.len();
        &self.endpoints[index]
    }
}

fn event_endpoint(base: &str) -> Result<Url, ConfigError> {
    let invalid = |reason: String| ConfigError::Invalid {
        field: "server-urls",
        reason: format!("{base}: {reason}"),
    };
    let mut url = Url::parse(base.trim()).map_err(|e| invalid(e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid("scheme must be http or https".to_string()));
    }
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url.join(EVENT_ENDPOINT_PATH)
        .map_err(|e| invalid(e.to_string()))
}

fn describe_failure(status: reqwest::StatusCode, body: &str) -> String {
    match serde_json::from_str::<CollectorReply>(body) {
        Ok(CollectorReply {
            text,
            code: Some(code),
        }) => format!("{text} (code {code})"),
        Ok(CollectorReply { text, code: None }) => text,
        Err(_) if body.trim().is_empty() => status
            .canonical_reason()
            .unwrap_or("unknown status")
            .to_string(),
        Err(_) => body.trim().to_string(),
    }
}

#[async_trait]
impl Sink for HecSink {
    fn name(&self) -> &'static str {
        "hec"
    }

    async fn submit(&self, envelope: &Envelope) -> Result<(), SinkError> {
        let endpoint = self.next_endpoint();
        let body = serde_json::to_vec(envelope)?;

        let start = Instant::now();
        let response = self
            .client
            .post(endpoint.clone())
            .headers(self.headers.clone())
            .body(body)
            .send()
            .await
            .map_err(|e| {
                error!("Failed to send audit event to {endpoint}: {e}");
                SinkError::Transport(e)
            })?;

        let status = response.status();
        if status.is_success() {
            debug!(
                "Sent audit event to {endpoint} in {} ms, status {status}",
                start.elapsed().as_millis()
            );
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        let message = describe_failure(status, &body);
        error!("Event collector {endpoint} rejected audit event with {status}: {message}");
        Err(SinkError::Status { status, message })
    }
}
