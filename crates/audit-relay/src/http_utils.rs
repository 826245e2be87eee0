// Copyright 2025-Present Kubernetes Audit Relay Authors
// SPDX-License-Identifier: Apache-2.0

use core::time::Duration;

use bytes::Bytes;
use http_body_util::Full;
use hyper::{
    header,
    http::{self, HeaderMap},
    Response, StatusCode,
};
use tracing::{debug, error};

use crate::config::ConfigError;

pub type HttpResponse = Response<Full<Bytes>>;

/// Logs the given message and returns an empty-bodied response with the given status code.
///
/// A success status code (within 200-299) logs at debug, anything else at error. The
/// audit webhook backend only looks at the status, so no body is ever returned.
pub fn log_and_create_empty_response(
    message: &str,
    status: StatusCode,
) -> http::Result<HttpResponse> {
    if status.is_success() {
        debug!("{message}");
    } else {
        error!("{message}");
    }
    empty_response(status)
}

pub fn empty_response(status: StatusCode) -> http::Result<HttpResponse> {
    Response::builder().status(status).body(Full::new(Bytes::new()))
}

/// Takes a request's header map, and verifies that the "content-length" header, if present, is
/// valid and not larger than the given max_content_length.
///
/// A missing header is accepted: chunked bodies are bounded while they are read. Will return
/// None if no issues are found. Otherwise logs an error (with the given prefix) and returns an
/// HTTP Response with the appropriate error status code.
pub fn verify_request_content_length(
    header_map: &HeaderMap,
    max_content_length: Option<usize>,
    error_message_prefix: &str,
) -> Option<http::Result<HttpResponse>> {
    let content_length_header = match header_map.get(header::CONTENT_LENGTH) {
        Some(res) => res,
        None => {
            if let Some(transfer_encoding_header) = header_map.get(header::TRANSFER_ENCODING) {
                debug!(
                    "Transfer-Encoding header is present: {:?}",
                    transfer_encoding_header
                );
            }
            return None;
        }
    };
    let content_length = match content_length_header
        .to_str()
        .ok()
        .and_then(|value| value.trim().parse::<usize>().ok())
    {
        Some(res) => res,
        None => {
            return Some(log_and_create_empty_response(
                &format!("{error_message_prefix}: Invalid Content-Length header"),
                StatusCode::BAD_REQUEST,
            ));
        }
    };
    match max_content_length {
        Some(max) if content_length > max => Some(log_and_create_empty_response(
            &format!(
                "{error_message_prefix}: Payload of {content_length} bytes exceeds the {max} byte limit"
            ),
            StatusCode::PAYLOAD_TOO_LARGE,
        )),
        _ => None,
    }
}

/// Builds the reqwest client used for the event collector.
///
/// Uses rustls. `insecure` disables server certificate verification; `identity` is presented
/// for mutual TLS.
pub fn build_client(
    timeout: Duration,
    insecure: bool,
    identity: Option<reqwest::Identity>,
) -> Result<reqwest::Client, ConfigError> {
    let mut builder = reqwest::Client::builder()
        .use_rustls_tls()
        .timeout(timeout)
        .danger_accept_invalid_certs(insecure);
    if let Some(identity) = identity {
        builder = builder.identity(identity);
    }
    builder.build().map_err(|e| ConfigError::Invalid {
        field: "client-tls-cert",
        reason: format!("unable to build HTTP client: {e}"),
    })
}
