// Copyright 2025-Present Kubernetes Audit Relay Authors
// SPDX-License-Identifier: Apache-2.0

use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use audit_relay::config::{ConfigError, ConfigSources, RelayConfig, SinkMode};
use audit_relay::envelope::EnvelopeTemplate;
use audit_relay::forwarder::EventForwarder;
use audit_relay::logger;
use audit_relay::sink::{HecSink, Sink, StdoutSink};
use audit_relay::webhook::WebhookServer;
use audit_relay::VERSION;
use figment::Provider;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// One of the relay binaries: its name, where it reads configuration from and its sink.
#[derive(Debug, Clone, Copy)]
pub struct Command {
    pub name: &'static str,
    pub env_prefix: &'static str,
    pub mode: SinkMode,
}

pub const SPLUNK_AUDIT_WEBHOOK: Command = Command {
    name: "splunk-audit-webhook",
    env_prefix: "SPLUNK_AUDIT_WEBHOOK_",
    mode: SinkMode::Hec,
};

pub const KUBERNETES_AUDIT_TAILER: Command = Command {
    name: "kubernetes-audit-tailer",
    env_prefix: "KUBERNETES_AUDIT_TAILER_",
    mode: SinkMode::Stdout,
};

impl Command {
    pub fn load_config<P: Provider>(
        &self,
        config_file: Option<&Path>,
        flags: P,
    ) -> Result<RelayConfig, ConfigError> {
        ConfigSources {
            module_name: self.name,
            env_prefix: self.env_prefix,
        }
        .load(config_file, flags, self.mode)
    }

    pub fn build_sink(&self, config: &RelayConfig) -> Result<Arc<dyn Sink>, ConfigError> {
        Ok(match self.mode {
            SinkMode::Hec => Arc::new(HecSink::from_config(config)?),
            SinkMode::Stdout => Arc::new(StdoutSink::stdout()),
        })
    }

    /// Serves until SIGINT or SIGTERM.
    pub async fn run(&self, config: RelayConfig) -> anyhow::Result<()> {
        let sink = self.build_sink(&config)?;
        let forwarder = Arc::new(EventForwarder::new(
            EnvelopeTemplate::from_config(&config),
            sink,
        ));
        let server = WebhookServer::new(&config, forwarder)?;
        let listener = server.bind().await?;

        info!(
            "Starting {} {VERSION} on {} (tls: {}, sink: {})",
            self.name,
            server.listen_address(),
            server.is_tls(),
            match self.mode {
                SinkMode::Hec => "hec",
                SinkMode::Stdout => "stdout",
            }
        );

        let shutdown = CancellationToken::new();
        let signal_token = shutdown.clone();
        tokio::spawn(async move {
            wait_for_signal().await;
            signal_token.cancel();
        });

        server.serve(listener, shutdown).await;
        info!("{} stopped", self.name);
        Ok(())
    }

    /// Loads configuration, installs logging and serves. Any startup failure exits with 1.
    pub async fn main<P: Provider>(&self, config_file: Option<&Path>, flags: P) -> ExitCode {
        let config = match self.load_config(config_file, flags) {
            Ok(config) => config,
            Err(e) => {
                // logging is configured from this same config, so it is not installed yet
                eprintln!("{}: {e}", self.name);
                return ExitCode::FAILURE;
            }
        };

        if let Err(e) = logger::init(config.log_level) {
            eprintln!("{}: {e}", self.name);
            return ExitCode::FAILURE;
        }
        match &config.config_file {
            Some(path) => info!("Read config file {}", path.display()),
            None => debug!("No config file found, using flags and environment only"),
        }

        match self.run(config).await {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                error!("{e:#}");
                ExitCode::FAILURE
            }
        }
    }
}

async fn wait_for_signal() {
    let interrupt = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for SIGINT: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = interrupt => info!("Received SIGINT, shutting down"),
        () = terminate => info!("Received SIGTERM, shutting down"),
    }
}
