// Copyright 2025-Present Kubernetes Audit Relay Authors
// SPDX-License-Identifier: Apache-2.0

use std::process::ExitCode;

use audit_relay_cmd::app::KUBERNETES_AUDIT_TAILER;
use audit_relay_cmd::cli::TailerCli;
use clap::Parser;
use figment::providers::Serialized;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = TailerCli::parse();
    KUBERNETES_AUDIT_TAILER
        .main(cli.config.as_deref(), Serialized::defaults(cli.clone()))
        .await
}
