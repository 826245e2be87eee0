// Copyright 2025-Present Kubernetes Audit Relay Authors
// SPDX-License-Identifier: Apache-2.0

//! Relay for Kubernetes audit webhook payloads.
//!
//! The API server's webhook audit backend POSTs batches of audit events to the
//! [`webhook::WebhookServer`]. Every request body is wrapped in an
//! [`envelope::Envelope`] by the [`forwarder::EventForwarder`] and submitted once to a
//! single [`sink::Sink`]: either an HTTP Event Collector cluster or standard output.

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod config;
pub mod envelope;
pub mod forwarder;
pub mod http_utils;
pub mod logger;
pub mod sink;
pub mod tls;
pub mod webhook;

/// Version reported by the binaries on startup.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
