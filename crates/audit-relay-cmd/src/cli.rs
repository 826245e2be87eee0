// Copyright 2025-Present Kubernetes Audit Relay Authors
// SPDX-License-Identifier: Apache-2.0

//! Command-line flags.
//!
//! Every flag is optional: a flag that is not given leaves the value from the config file,
//! the environment or the defaults in place. The parsed flags are serialized with the same
//! kebab-case keys the config file uses and merged last.

use std::path::PathBuf;

use clap::{Args, Parser};
use serde::Serialize;

/// Listener options shared by both binaries.
#[derive(Debug, Default, Clone, Args, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct ListenerArgs {
    /// Address to listen on
    #[arg(long, value_name = "ADDR")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bind_addr: Option<String>,

    /// Port to listen on
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    /// Path the audit webhook posts to
    #[arg(long, value_name = "PATH")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audit_serve_path: Option<String>,

    /// PEM certificate for serving HTTPS
    #[arg(long, value_name = "FILE")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub webhook_tls_cert: Option<PathBuf>,

    /// PEM private key for serving HTTPS
    #[arg(long, value_name = "FILE")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub webhook_tls_key: Option<PathBuf>,

    /// Largest accepted request body in bytes, 0 for no limit
    #[arg(long, value_name = "BYTES")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_request_body_bytes: Option<u64>,

    /// One of error, warn, info, debug, trace
    #[arg(long, value_name = "LEVEL")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,
}

/// Event collector options.
#[derive(Debug, Default, Clone, Args, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct HecArgs {
    /// Event collector base URLs, comma separated
    #[arg(long, value_name = "URLS", value_delimiter = ',')]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_urls: Option<Vec<String>>,

    /// Event collector token
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    /// Skip verification of the collector's certificate
    #[arg(long, value_name = "BOOL", num_args = 0..=1, default_missing_value = "true")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub insecure_cert: Option<bool>,

    /// PEM client certificate for mutual TLS with the collector
    #[arg(long, value_name = "FILE")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_tls_cert: Option<PathBuf>,

    /// PEM client key for mutual TLS with the collector
    #[arg(long, value_name = "FILE")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_tls_key: Option<PathBuf>,

    /// Host label attached to every event
    #[arg(long, value_name = "HOST")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hec_host: Option<String>,

    /// Source attached to every event
    #[arg(long, value_name = "SOURCE")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hec_source: Option<String>,

    /// Sourcetype attached to every event
    #[arg(long, value_name = "SOURCETYPE")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hec_sourcetype: Option<String>,

    /// Index events are written to
    #[arg(long, value_name = "INDEX")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hec_index: Option<String>,

    /// Send the receipt time with every event
    #[arg(long, value_name = "BOOL", num_args = 0..=1, default_missing_value = "true")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stamp_event_time: Option<bool>,

    /// Timeout for requests to the collector
    #[arg(long, value_name = "SECONDS")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_timeout_secs: Option<u64>,
}

/// Receives Kubernetes audit webhook batches and forwards them to an HTTP Event Collector.
#[derive(Debug, Clone, Parser, Serialize)]
#[command(name = "splunk-audit-webhook", version)]
pub struct WebhookCli {
    /// YAML config file
    #[arg(short, long, value_name = "FILE")]
    #[serde(skip)]
    pub config: Option<PathBuf>,

    #[command(flatten)]
    #[serde(flatten)]
    pub listener: ListenerArgs,

    #[command(flatten)]
    #[serde(flatten)]
    pub hec: HecArgs,
}

/// Receives Kubernetes audit webhook batches and writes them to stdout.
#[derive(Debug, Clone, Parser, Serialize)]
#[command(name = "kubernetes-audit-tailer", version)]
pub struct TailerCli {
    /// YAML config file
    #[arg(short, long, value_name = "FILE")]
    #[serde(skip)]
    pub config: Option<PathBuf>,

    #[command(flatten)]
    #[serde(flatten)]
    pub listener: ListenerArgs,
}
