// Copyright 2025-Present Kubernetes Audit Relay Authors
// SPDX-License-Identifier: Apache-2.0

//! Destinations for audit envelopes.
//!
//! A relay process owns exactly one sink for its lifetime. Sinks are shared across request
//! handlers and must tolerate concurrent `submit` calls.

pub mod hec;
pub mod stdout;

use async_trait::async_trait;
use reqwest::StatusCode;

use crate::envelope::Envelope;

pub use hec::HecSink;
pub use stdout::StdoutSink;

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("request to event collector failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("event collector responded with {status}: {message}")]
    Status { status: StatusCode, message: String },

    #[error("failed to encode envelope: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("failed to write envelope: {0}")]
    Io(#[from] std::io::Error),
}

#[async_trait]
pub trait Sink: Send + Sync {
    /// Short label used in log lines.
    fn name(&self) -> &'static str;

    /// Delivers one envelope. Called exactly once per accepted request; implementations
    /// must not retry.
    async fn submit(&self, envelope: &Envelope) -> Result<(), SinkError>;
}
