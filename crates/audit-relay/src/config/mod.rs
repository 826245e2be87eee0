// Copyright 2025-Present Kubernetes Audit Relay Authors
// SPDX-License-Identifier: Apache-2.0

//! Configuration for the relay binaries.
//!
//! ## Configuration Priority
//!
//! Sources are merged in the following order (later sources override earlier):
//!
//! 1. **Defaults** - [`RelayConfig::default`]
//! 2. **YAML file** - `--config <path>`, or the first `config.yaml` found in
//!    `/etc/<binary>/`, `$HOME/.<binary>/` and the working directory
//! 3. **Environment variables** - `<PREFIX>_<OPTION>`, e.g. `SPLUNK_AUDIT_WEBHOOK_SERVER_URLS`
//! 4. **Command-line flags** - passed in by the binary as an extra provider
//!
//! Keys use the flag spelling (`bind-addr`, `server-urls`, ...) in YAML. Environment
//! variables use underscores in place of dashes.
//!
//! ## Edge Cases
//!
//! - Empty strings for optional values (host label, TLS paths, ...) are treated as unset.
//! - `server-urls` accepts a list or a comma-separated string.
//! - String options set in the environment are taken verbatim, so a token such as `0123`
//!   keeps its leading zero and a host label such as `[cluster-a]` is not read as a list.
//!   In YAML such values need quoting.
//! - A certificate without its key (or the reverse) is rejected instead of ignored.

pub mod log_level;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::providers::{Env, Format, Serialized, Yaml};
use figment::{Figment, Provider};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::config::log_level::LogLevel;

const DEFAULT_BIND_ADDR: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_AUDIT_SERVE_PATH: &str = "/audit";
const DEFAULT_MAX_REQUEST_BODY_BYTES: u64 = 10 * 1024 * 1024;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
const CONFIG_FILE_NAME: &str = "config.yaml";

/// Options that are plain strings. Their environment values must not go through figment's
/// value parsing, which turns `0123` into the integer 123.
const STRING_KEYS: &[&str] = &[
    "bind-addr",
    "audit-serve-path",
    "webhook-tls-cert",
    "webhook-tls-key",
    "token",
    "client-tls-cert",
    "client-tls-key",
    "hec-host",
    "hec-source",
    "hec-sourcetype",
    "hec-index",
];

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config file {} is unreadable: {reason}", path.display())]
    Unreadable { path: PathBuf, reason: String },

    #[error("failed to parse configuration: {0}")]
    Parse(#[source] Box<figment::Error>),

    #[error("missing required option: {0}")]
    Missing(&'static str),

    #[error("invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("failed to load TLS material from {}: {reason}", path.display())]
    Tls { path: PathBuf, reason: String },
}

/// Which sink the relay submits envelopes to. Decides which options are required.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SinkMode {
    /// Forward to an HTTP Event Collector cluster.
    Hec,
    /// Write raw payloads to standard output.
    Stdout,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct RelayConfig {
    pub bind_addr: String,
    pub port: u16,
    pub audit_serve_path: String,
    #[serde(
        deserialize_with = "deserialize_optional_path",
        skip_serializing_if = "Option::is_none"
    )]
    pub webhook_tls_cert: Option<PathBuf>,
    #[serde(
        deserialize_with = "deserialize_optional_path",
        skip_serializing_if = "Option::is_none"
    )]
    pub webhook_tls_key: Option<PathBuf>,
    /// Upper bound for inbound request bodies. `0` disables the limit.
    pub max_request_body_bytes: u64,
    pub log_level: LogLevel,

    #[serde(deserialize_with = "deserialize_string_list")]
    pub server_urls: Vec<String>,
    #[serde(
        deserialize_with = "deserialize_optional_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub token: Option<String>,
    pub insecure_cert: bool,
    #[serde(
        deserialize_with = "deserialize_optional_path",
        skip_serializing_if = "Option::is_none"
    )]
    pub client_tls_cert: Option<PathBuf>,
    #[serde(
        deserialize_with = "deserialize_optional_path",
        skip_serializing_if = "Option::is_none"
    )]
    pub client_tls_key: Option<PathBuf>,
    #[serde(
        deserialize_with = "deserialize_optional_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub hec_host: Option<String>,
    #[serde(
        deserialize_with = "deserialize_optional_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub hec_source: Option<String>,
    #[serde(
        deserialize_with = "deserialize_optional_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub hec_sourcetype: Option<String>,
    #[serde(
        deserialize_with = "deserialize_optional_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub hec_index: Option<String>,
    /// Stamp envelopes with the receipt time instead of leaving `time` to the collector.
    pub stamp_event_time: bool,
    pub request_timeout_secs: u64,

    /// The YAML file the configuration was read from, if any.
    #[serde(skip)]
    pub config_file: Option<PathBuf>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            port: DEFAULT_PORT,
            audit_serve_path: DEFAULT_AUDIT_SERVE_PATH.to_string(),
            webhook_tls_cert: None,
            webhook_tls_key: None,
            max_request_body_bytes: DEFAULT_MAX_REQUEST_BODY_BYTES,
            log_level: LogLevel::default(),
            server_urls: Vec::new(),
            token: None,
            insecure_cert: false,
            client_tls_cert: None,
            client_tls_key: None,
            hec_host: None,
            hec_source: None,
            hec_sourcetype: None,
            hec_index: None,
            stamp_event_time: false,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            config_file: None,
        }
    }
}

impl RelayConfig {
    /// Checks the options required by `mode`. Called by [`ConfigSources::load`].
    pub fn validate(&self, mode: SinkMode) -> Result<(), ConfigError> {
        if self.bind_addr.trim().is_empty() {
            return Err(ConfigError::Missing("bind-addr"));
        }
        if self.audit_serve_path.trim().is_empty() {
            return Err(ConfigError::Missing("audit-serve-path"));
        }
        if !self.audit_serve_path.starts_with('/') {
            return Err(ConfigError::Invalid {
                field: "audit-serve-path",
                reason: format!("'{}' must start with '/'", self.audit_serve_path),
            });
        }
        check_pair(
            "webhook-tls-cert",
            &self.webhook_tls_cert,
            "webhook-tls-key",
            &self.webhook_tls_key,
        )?;

        if mode == SinkMode::Stdout {
            return Ok(());
        }

        if self.server_urls.is_empty() {
            return Err(ConfigError::Missing("server-urls"));
        }
        for url in &self.server_urls {
            let parsed = reqwest::Url::parse(url).map_err(|e| ConfigError::Invalid {
                field: "server-urls",
                reason: format!("'{url}': {e}"),
            })?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(ConfigError::Invalid {
                    field: "server-urls",
                    reason: format!("'{url}': scheme must be http or https"),
                });
            }
        }
        if self.token.as_deref().map_or(true, |t| t.trim().is_empty()) {
            return Err(ConfigError::Missing("token"));
        }
        check_pair(
            "client-tls-cert",
            &self.client_tls_cert,
            "client-tls-key",
            &self.client_tls_key,
        )?;
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "request-timeout-secs",
                reason: "must be greater than 0".to_string(),
            });
        }
        Ok(())
    }

    /// `host:port` string for the listener. IPv6 literals are bracketed.
    #[must_use]
    pub fn listen_address(&self) -> String {
        let host = self.bind_addr.trim();
        if host.contains(':') && !host.starts_with('[') {
            format!("[{host}]:{}", self.port)
        } else {
            format!("{host}:{}", self.port)
        }
    }

    #[must_use]
    pub fn webhook_tls_files(&self) -> Option<(&Path, &Path)> {
        match (&self.webhook_tls_cert, &self.webhook_tls_key) {
            (Some(cert), Some(key)) => Some((cert.as_path(), key.as_path())),
            _ => None,
        }
    }

    #[must_use]
    pub fn client_tls_files(&self) -> Option<(&Path, &Path)> {
        match (&self.client_tls_cert, &self.client_tls_key) {
            (Some(cert), Some(key)) => Some((cert.as_path(), key.as_path())),
            _ => None,
        }
    }

    /// The body limit in bytes, or `None` when unlimited.
    #[must_use]
    pub fn body_limit(&self) -> Option<usize> {
        match self.max_request_body_bytes {
            0 => None,
            n => Some(usize::try_from(n).unwrap_or(usize::MAX)),
        }
    }

    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn check_pair(
    cert_field: &'static str,
    cert: &Option<PathBuf>,
    key_field: &'static str,
    key: &Option<PathBuf>,
) -> Result<(), ConfigError> {
    match (cert, key) {
        (Some(_), None) => Err(ConfigError::Invalid {
            field: key_field,
            reason: format!("{cert_field} is set but {key_field} is not"),
        }),
        (None, Some(_)) => Err(ConfigError::Invalid {
            field: cert_field,
            reason: format!("{key_field} is set but {cert_field} is not"),
        }),
        _ => Ok(()),
    }
}

/// Where a binary looks for its configuration.
#[derive(Debug, Clone, Copy)]
pub struct ConfigSources {
    /// Binary name, used for the `/etc/<name>` and `$HOME/.<name>` search paths.
    pub module_name: &'static str,
    /// Environment variable prefix including the trailing underscore.
    pub env_prefix: &'static str,
}

impl ConfigSources {
    /// Loads and validates the configuration.
    ///
    /// `overrides` is merged last and is how command-line flags take precedence.
    pub fn load<P: Provider>(
        &self,
        config_file: Option<&Path>,
        overrides: P,
        mode: SinkMode,
    ) -> Result<RelayConfig, ConfigError> {
        let file = self.resolve_config_file(config_file)?;

        let mut figment = Figment::from(Serialized::defaults(RelayConfig::default()));
        if let Some(path) = &file {
            figment = figment.merge(Yaml::file(path));
        }
        let figment = figment
            .merge(self.env().ignore(STRING_KEYS))
            .merge(self.string_env())
            .merge(overrides);

        let mut config: RelayConfig = figment
            .extract()
            .map_err(|e| ConfigError::Parse(Box::new(e)))?;
        config.config_file = file;
        config.validate(mode)?;
        Ok(config)
    }

    fn env(&self) -> Env {
        Env::prefixed(self.env_prefix)
            .map(|key| key.as_str().to_ascii_lowercase().replace('_', "-").into())
    }

    fn string_env(&self) -> Serialized<BTreeMap<String, String>> {
        let values = self
            .env()
            .only(STRING_KEYS)
            .iter()
            .map(|(key, value)| (key.as_str().to_string(), value))
            .collect();
        Serialized::defaults(values)
    }

    fn search_paths(&self) -> Vec<PathBuf> {
        let mut paths = vec![Path::new("/etc").join(self.module_name).join(CONFIG_FILE_NAME)];
        if let Some(home) = std::env::var_os("HOME") {
            paths.push(
                PathBuf::from(home)
                    .join(format!(".{}", self.module_name))
                    .join(CONFIG_FILE_NAME),
            );
        }
        paths.push(PathBuf::from(CONFIG_FILE_NAME));
        paths
    }

    fn resolve_config_file(&self, explicit: Option<&Path>) -> Result<Option<PathBuf>, ConfigError> {
        if let Some(path) = explicit {
            return match std::fs::metadata(path) {
                Ok(meta) if meta.is_file() => Ok(Some(path.to_path_buf())),
                Ok(_) => Err(ConfigError::Unreadable {
                    path: path.to_path_buf(),
                    reason: "not a regular file".to_string(),
                }),
                Err(e) => Err(ConfigError::Unreadable {
                    path: path.to_path_buf(),
                    reason: e.to_string(),
                }),
            };
        }
        Ok(self.search_paths().into_iter().find(|p| p.is_file()))
    }
}

fn deserialize_optional_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(None),
        Value::String(s) if s.trim().is_empty() => Ok(None),
        Value::String(s) => Ok(Some(s)),
        Value::Number(n) => Ok(Some(n.to_string())),
        Value::Bool(b) => Ok(Some(b.to_string())),
        other => Err(serde::de::Error::custom(format!(
            "expected a string, got {other}"
        ))),
    }
}

fn deserialize_optional_path<'de, D>(deserializer: D) -> Result<Option<PathBuf>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(deserialize_optional_string(deserializer)?.map(PathBuf::from))
}

fn deserialize_string_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    fn split(s: &str) -> impl Iterator<Item = String> + '_ {
        s.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    }

    match Value::deserialize(deserializer)? {
        Value::Null => Ok(Vec::new()),
        Value::String(s) => Ok(split(&s).collect()),
        Value::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                match item {
                    Value::String(s) => out.extend(split(&s)),
                    other => {
                        return Err(serde::de::Error::custom(format!(
                            "expected a list of strings, got {other}"
                        )))
                    }
                }
            }
            Ok(out)
        }
        other => Err(serde::de::Error::custom(format!(
            "expected a list of strings, got {other}"
        ))),
    }
}
