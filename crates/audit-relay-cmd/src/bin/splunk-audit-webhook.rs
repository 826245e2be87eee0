// Copyright 2025-Present Kubernetes Audit Relay Authors
// SPDX-License-Identifier: Apache-2.0

use std::process::ExitCode;

use audit_relay_cmd::app::SPLUNK_AUDIT_WEBHOOK;
use audit_relay_cmd::cli::WebhookCli;
use clap::Parser;
use figment::providers::Serialized;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = WebhookCli::parse();
    SPLUNK_AUDIT_WEBHOOK
        .main(cli.config.as_deref(), Serialized::defaults(cli.clone()))
        .await
}
