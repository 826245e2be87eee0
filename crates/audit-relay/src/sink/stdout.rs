// Copyright 2025-Present Kubernetes Audit Relay Authors
// SPDX-License-Identifier: Apache-2.0

use async_trait::async_trait;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;

use crate::envelope::Envelope;
use crate::sink::{Sink, SinkError};

/// Writes each raw request body to a stream, one body per line.
///
/// Only the body is written, not the envelope. Writes are serialized so concurrent bodies
/// never interleave.
pub struct StdoutSink<W = tokio::io::Stdout> {
    writer: Mutex<W>,
}

impl StdoutSink<tokio::io::Stdout> {
    #[must_use]
    pub fn stdout() -> Self {
        StdoutSink::new(tokio::io::stdout())
    }
}

impl<W> StdoutSink<W>
where
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(writer: W) -> Self {
        StdoutSink {
            writer: Mutex::new(writer),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }
}

#[async_trait]
impl<W> Sink for StdoutSink<W>
where
    W: AsyncWrite + Unpin + Send,
{
    fn name(&self) -> &'static str {
        "stdout"
    }

    async fn submit(&self, envelope: &Envelope) -> Result<(), SinkError> {
        let raw = envelope.raw();
        let mut writer = self.writer.lock().await;
        writer.write_all(raw).await?;
        if !raw.ends_with(b"\n") {
            writer.write_all(b"\n").await?;
        }
        writer.flush().await?;
        Ok(())
    }
}
