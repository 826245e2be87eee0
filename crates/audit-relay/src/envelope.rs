// Copyright 2025-Present Kubernetes Audit Relay Authors
// SPDX-License-Identifier: Apache-2.0

//! The event envelope submitted to a sink.
//!
//! Serialized in the HTTP Event Collector format:
//!
//! ```json
//! {"time": 1700000000.123, "host": "cluster-a", "sourcetype": "kube:audit", "event": "{...}"}
//! ```
//!
//! Optional fields are omitted when unset so the collector applies its own defaults.

use std::borrow::Cow;
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use serde::{Serialize, Serializer};
use tracing::warn;

use crate::config::RelayConfig;

#[derive(Debug, Clone, Serialize)]
pub struct Envelope {
    #[serde(
        serialize_with = "serialize_epoch_seconds",
        skip_serializing_if = "Option::is_none"
    )]
    pub time: Option<SystemTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sourcetype: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index: Option<String>,
    pub event: String,
    /// The request body exactly as received.
    #[serde(skip)]
    raw: Bytes,
}

impl Envelope {
    /// Wraps `raw` with no metadata. The body is decoded as UTF-8; invalid sequences are
    /// replaced with U+FFFD rather than rejected.
    #[must_use]
    pub fn new(raw: Bytes) -> Self {
        let event = match String::from_utf8_lossy(&raw) {
            Cow::Borrowed(text) => text.to_string(),
            Cow::Owned(text) => {
                warn!(
                    "Audit payload of {} bytes is not valid UTF-8, invalid sequences were replaced",
                    raw.len()
                );
                text
            }
        };
        Self {
            time: None,
            host: None,
            source: None,
            sourcetype: None,
            index: None,
            event,
            raw,
        }
    }

    #[must_use]
    pub fn raw(&self) -> &Bytes {
        &self.raw
    }
}

fn serialize_epoch_seconds<S>(time: &Option<SystemTime>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match time {
        Some(time) => {
            let millis = time
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_millis())
                .unwrap_or_default();
            // HEC accepts fractional epoch seconds; millisecond precision is what it indexes
            serializer.serialize_f64(millis as f64 / 1000.0)
        }
        None => serializer.serialize_none(),
    }
}

/// Startup-time metadata applied to every envelope.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnvelopeTemplate {
    pub host: Option<String>,
    pub source: Option<String>,
    pub sourcetype: Option<String>,
    pub index: Option<String>,
    pub stamp_event_time: bool,
}

impl EnvelopeTemplate {
    #[must_use]
    pub fn from_config(config: &RelayConfig) -> Self {
        Self {
            host: non_empty(config.hec_host.as_deref()),
            source: non_empty(config.hec_source.as_deref()),
            sourcetype: non_empty(config.hec_sourcetype.as_deref()),
            index: non_empty(config.hec_index.as_deref()),
            stamp_event_time: config.stamp_event_time,
        }
    }

    #[must_use]
    pub fn with_host(mut self, host: &str) -> Self {
        self.host = non_empty(Some(host));
        self
    }

    /// Builds the envelope for one request body.
    #[must_use]
    pub fn wrap(&self, raw: Bytes) -> Envelope {
        let mut envelope = Envelope::new(raw);
        envelope.host.clone_from(&self.host);
        envelope.source.clone_from(&self.source);
        envelope.sourcetype.clone_from(&self.sourcetype);
        envelope.index.clone_from(&self.index);
        if self.stamp_event_time {
            envelope.time = Some(SystemTime::now());
        }
        envelope
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
