// Copyright 2025-Present Kubernetes Audit Relay Authors
// SPDX-License-Identifier: Apache-2.0

//! Mock sinks for testing the listener without an event collector

use async_trait::async_trait;
use audit_relay::envelope::Envelope;
use audit_relay::sink::{Sink, SinkError};
use bytes::Bytes;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Records every envelope it receives, optionally after a delay
#[derive(Default)]
pub struct RecordingSink {
    delay: Option<Duration>,
    envelopes: Mutex<Vec<Envelope>>,
}

#[allow(dead_code)]
impl RecordingSink {
    pub fn with_delay(delay: Duration) -> Self {
        RecordingSink {
            delay: Some(delay),
            ..Default::default()
        }
    }

    pub fn envelopes(&self) -> Vec<Envelope> {
        self.envelopes.lock().unwrap().clone()
    }

    pub fn bodies(&self) -> Vec<Bytes> {
        self.envelopes().iter().map(|e| e.raw().clone()).collect()
    }
}

#[async_trait]
impl Sink for RecordingSink {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn submit(&self, envelope: &Envelope) -> Result<(), SinkError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.envelopes.lock().unwrap().push(envelope.clone());
        Ok(())
    }
}

/// Fails every submission
pub struct FailingSink;

#[async_trait]
impl Sink for FailingSink {
    fn name(&self) -> &'static str {
        "failing"
    }

    async fn submit(&self, _envelope: &Envelope) -> Result<(), SinkError> {
        Err(SinkError::Io(std::io::Error::other("sink unavailable")))
    }
}

/// Fails the first submission and succeeds afterwards
#[derive(Default)]
pub struct FlakySink {
    pub calls: AtomicUsize,
}

#[async_trait]
impl Sink for FlakySink {
    fn name(&self) -> &'static str {
        "flaky"
    }

    async fn submit(&self, _envelope: &Envelope) -> Result<(), SinkError> {
        if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
            return Err(SinkError::Io(std::io::Error::other("first call fails")));
        }
        Ok(())
    }
}
