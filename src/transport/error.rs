//! Delivery failures and how the pipeline treats them
//!
//! Transports map whatever went wrong onto a [`TransportErrorKind`]. The
//! send pipeline only looks at the kind: transient kinds are retried with
//! backoff, everything else marks the message `failed` straight away.

use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// A failed delivery attempt
#[derive(Debug, Clone, Error)]
#[error("{kind}: {message}")]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub message: String,
    /// Minimum wait the receiver asked for before the next attempt
    pub retry_after: Option<Duration>,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            retry_after: None,
        }
    }

    #[must_use]
    pub fn with_retry_after(mut self, duration: Duration) -> Self {
        self.retry_after = Some(duration);
        self
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Network, message)
    }

    pub fn rate_limit(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::RateLimit, message)
    }

    pub fn server_error(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::ServerError, message)
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Auth, message)
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::InvalidRequest, message)
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Unknown, message)
    }

    pub fn is_transient(&self) -> bool {
        self.kind.is_transient()
    }
}

/// Where a delivery broke down.
///
/// Status code mapping used by the HTTP transport is noted per variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// The exchange never completed: timeout, refused or reset connection,
    /// hang-up before a response, unreadable body, or a 408
    Network,
    /// 429, optionally with a `retry_after` hint
    RateLimit,
    /// 5xx
    ServerError,
    /// 401, 403
    Auth,
    /// 400, 422. Resending the same message won't help.
    InvalidRequest,
    /// Any other status, an unparseable reply, or a client-side failure
    Unknown,
}

impl TransportErrorKind {
    /// Worth another attempt with the same message
    pub fn is_transient(self) -> bool {
        matches!(self, Self::Network | Self::RateLimit | Self::ServerError)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Network => "network error",
            Self::RateLimit => "rate limited",
            Self::ServerError => "server error",
            Self::Auth => "not authorized",
            Self::InvalidRequest => "rejected",
            Self::Unknown => "delivery error",
        }
    }
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
