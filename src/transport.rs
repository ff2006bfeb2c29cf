//! Delivery transport abstraction
//!
//! The pipeline hands each outgoing message to a [`Transport`] and awaits a
//! reply or a classified [`TransportError`].

mod echo;
mod error;
mod http;

pub use echo::EchoTransport;
pub use error::{TransportError, TransportErrorKind};
pub use http::HttpTransport;

use crate::message::Message;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// One delivery attempt for a pending message
#[derive(Debug, Clone, Serialize)]
pub struct DeliveryRequest {
    pub message: Message,
    /// 1-based attempt number
    pub attempt: u32,
    /// Earlier messages that were delivered, oldest first
    pub history: Vec<Message>,
}

/// What the receiver sent back
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct DeliveryReply {
    #[serde(default)]
    pub reply: Option<String>,
}

impl DeliveryReply {
    pub fn text(reply: impl Into<String>) -> Self {
        Self {
            reply: Some(reply.into()),
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// Reply content worth recording; blank replies count as none
    pub fn into_text(self) -> Option<String> {
        self.reply.filter(|text| !text.trim().is_empty())
    }
}

/// Async delivery primitive invoked by the send pipeline
#[async_trait]
pub trait Transport: Send + Sync {
    async fn deliver(&self, request: &DeliveryRequest) -> Result<DeliveryReply, TransportError>;

    /// Short name used in logs
    fn name(&self) -> &str;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn deliver(&self, request: &DeliveryRequest) -> Result<DeliveryReply, TransportError> {
        (**self).deliver(request).await
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// Logging wrapper for transports
pub struct LoggingTransport<T> {
    inner: T,
}

impl<T: Transport> LoggingTransport<T> {
    pub fn new(inner: T) -> Self {
        Self { inner }
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }
}

#[async_trait]
impl<T: Transport> Transport for LoggingTransport<T> {
    async fn deliver(&self, request: &DeliveryRequest) -> Result<DeliveryReply, TransportError> {
        let start = tokio::time::Instant::now();
        let result = self.inner.deliver(request).await;
        let duration = start.elapsed();

        match &result {
            Ok(reply) => {
                tracing::info!(
                    transport = %self.inner.name(),
                    message_id = %request.message.id,
                    attempt = request.attempt,
                    duration_ms = %duration.as_millis(),
                    has_reply = reply.reply.is_some(),
                    "Delivery completed"
                );
            }
            Err(e) => {
                tracing::warn!(
                    transport = %self.inner.name(),
                    message_id = %request.message.id,
                    attempt = request.attempt,
                    duration_ms = %duration.as_millis(),
                    kind = %e.kind,
                    error = %e.message,
                    transient = e.is_transient(),
                    "Delivery failed"
                );
            }
        }

        result
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}
