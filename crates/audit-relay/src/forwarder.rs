// Copyright 2025-Present Kubernetes Audit Relay Authors
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use tracing::{debug, error};

use crate::envelope::EnvelopeTemplate;
use crate::sink::{Sink, SinkError};

/// Wraps request bodies in envelopes and hands them to the configured sink.
///
/// Runs on the request's own task. There is no queue and no retry: the outcome of the
/// single submission is the outcome of the request.
pub struct EventForwarder {
    template: EnvelopeTemplate,
    sink: Arc<dyn Sink>,
}

impl EventForwarder {
    pub fn new(template: EnvelopeTemplate, sink: Arc<dyn Sink>) -> Self {
        EventForwarder { template, sink }
    }

    pub fn sink_name(&self) -> &'static str {
        self.sink.name()
    }

    pub async fn forward(&self, raw: Bytes) -> Result<(), SinkError> {
        let size = raw.len();
        let envelope = self.template.wrap(raw);

        let start = Instant::now();
        match self.sink.submit(&envelope).await {
            Ok(()) => {
                debug!(
                    "Forwarded {size} byte audit payload to {} sink in {} ms",
                    self.sink.name(),
                    start.elapsed().as_millis()
                );
                Ok(())
            }
            Err(e) => {
                error!(
                    "Failed to forward {size} byte audit payload to {} sink: {e}",
                    self.sink.name()
                );
                Err(e)
            }
        }
    }
}
