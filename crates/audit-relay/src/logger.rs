// Copyright 2025-Present Kubernetes Audit Relay Authors
// SPDX-License-Identifier: Apache-2.0

//! Process-wide log subscriber.
//!
//! Logs go to stderr. In tailer mode stdout carries nothing but audit payloads.

use tracing_subscriber::EnvFilter;

use crate::config::log_level::LogLevel;

#[derive(Debug, thiserror::Error)]
pub enum LoggerError {
    #[error("could not parse log filter: {0}")]
    Filter(#[from] tracing_subscriber::filter::ParseError),

    #[error("setting default subscriber failed: {0}")]
    AlreadySet(#[from] tracing::subscriber::SetGlobalDefaultError),
}

/// Filter directive for `level`, with the noisy HTTP and TLS dependencies silenced.
pub fn env_filter_directive(level: LogLevel) -> String {
    format!("h2=off,hyper=off,rustls=off,{level}")
}

/// Installs the global subscriber. Fails if one is already installed.
pub fn init(level: LogLevel) -> Result<(), LoggerError> {
    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(EnvFilter::try_new(env_filter_directive(level))?)
        .with_writer(std::io::stderr)
        .with_level(true)
        .with_thread_names(false)
        .with_thread_ids(false)
        .with_line_number(false)
        .with_file(false)
        .with_target(true)
        .with_ansi(false)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_filter_directive() {
        assert_eq!(
            env_filter_directive(LogLevel::Debug),
            "h2=off,hyper=off,rustls=off,debug"
        );
        for level in [
            LogLevel::Error,
            LogLevel::Warn,
            LogLevel::Info,
            LogLevel::Debug,
            LogLevel::Trace,
        ] {
            assert!(EnvFilter::try_new(env_filter_directive(level)).is_ok());
        }
    }
}
