//! JSON-over-HTTP transport

use super::{DeliveryReply, DeliveryRequest, Transport, TransportError};
use crate::config::TransportConfig;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Client, StatusCode};
use serde::Serialize;
use std::io;
use std::time::Duration;

/// Posts each message, with its delivered history, to a chat endpoint
pub struct HttpTransport {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
}

impl HttpTransport {
    pub fn new(endpoint: impl Into<String>, config: &TransportConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self::with_client(client, endpoint, config))
    }

    /// Use a preconfigured client. `config.timeout` is ignored.
    pub fn with_client(client: Client, endpoint: impl Into<String>, config: &TransportConfig) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
            api_key: config.api_key.clone(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn deliver(&self, request: &DeliveryRequest) -> Result<DeliveryReply, TransportError> {
        let body = WireRequest::from(request);

        let mut builder = self.client.post(&self.endpoint).json(&body);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await.map_err(|e| classify_send_error(&e))?;

        let status = response.status();
        let retry_after = retry_after_header(response.headers());
        let body = response
            .text()
            .await
            .map_err(|e| TransportError::network(format!("Failed to read response: {e}")))?;

        if !status.is_success() {
            return Err(classify_error(status, retry_after, &body));
        }

        parse_reply(&body)
    }

    fn name(&self) -> &str {
        "http"
    }
}

/// Anything that broke the exchange on the wire is `Network` and retried.
/// Builder, redirect and decode failures won't fix themselves.
fn classify_send_error(e: &reqwest::Error) -> TransportError {
    if e.is_timeout() {
        TransportError::network(format!("Request timeout: {e}"))
    } else if e.is_connect() {
        TransportError::network(format!("Connection failed: {e}"))
    } else if e.is_request() || is_connection_lost(e) {
        TransportError::network(format!("Connection lost: {e}"))
    } else {
        TransportError::unknown(format!("Request failed: {e}"))
    }
}

fn is_connection_lost(e: &reqwest::Error) -> bool {
    let mut source = std::error::Error::source(e);
    while let Some(err) = source {
        if let Some(io) = err.downcast_ref::<io::Error>() {
            return matches!(
                io.kind(),
                io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::BrokenPipe
                    | io::ErrorKind::UnexpectedEof
            );
        }
        source = err.source();
    }
    false
}

fn parse_reply(body: &str) -> Result<DeliveryReply, TransportError> {
    if body.trim().is_empty() {
        return Ok(DeliveryReply::empty());
    }
    serde_json::from_str(body).map_err(|e| {
        TransportError::unknown(format!("Failed to parse response: {e} - body: {body}"))
    })
}

fn retry_after_header(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<f64>().ok())
        .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
}

fn classify_error(status: StatusCode, retry_after: Option<Duration>, body: &str) -> TransportError {
    match status.as_u16() {
        401 | 403 => TransportError::auth(format!("Authentication failed: {body}")),
        429 => {
            let err = TransportError::rate_limit(format!("Rate limited: {body}"));
            // Header wins; fall back to a JSON body hint
            let hint = retry_after.or_else(|| {
                serde_json::from_str::<serde_json::Value>(body)
                    .ok()
                    .and_then(|v| v.get("retry_after").and_then(serde_json::Value::as_f64))
                    .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
            });
            match hint {
                Some(delay) => err.with_retry_after(delay),
                None => err,
            }
        }
        400 | 422 => TransportError::invalid_request(format!("Rejected by receiver: {body}")),
        408 => TransportError::network(format!("Receiver timed out: {body}")),
        500..=599 => TransportError::server_error(format!("Server error: {body}")),
        _ => TransportError::unknown(format!("HTTP {status}: {body}")),
    }
}

// Wire types

#[derive(Debug, Serialize)]
struct WireRequest<'a> {
    message: WireMessage<'a>,
    history: Vec<WireTurn<'a>>,
}

#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    id: String,
    role: &'static str,
    text: &'a str,
}

#[derive(Debug, Serialize)]
struct WireTurn<'a> {
    role: &'static str,
    text: &'a str,
}

impl<'a> From<&'a DeliveryRequest> for WireRequest<'a> {
    fn from(request: &'a DeliveryRequest) -> Self {
        Self {
            message: WireMessage {
                id: request.message.id.to_string(),
                role: request.message.role.as_str(),
                text: &request.message.text,
            },
            history: request
                .history
                .iter()
                .map(|m| WireTurn {
                    role: m.role.as_str(),
                    text: &m.text,
                })
                .collect(),
        }
    }
}
