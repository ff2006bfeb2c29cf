//! Offline transport that answers every message with its own text

use super::{DeliveryReply, DeliveryRequest, Transport, TransportError};
use async_trait::async_trait;

pub struct EchoTransport {
    prefix: String,
}

impl EchoTransport {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }
}

impl Default for EchoTransport {
    fn default() -> Self {
        Self::new("echo: ")
    }
}

#[async_trait]
impl Transport for EchoTransport {
    async fn deliver(&self, request: &DeliveryRequest) -> Result<DeliveryReply, TransportError> {
        Ok(DeliveryReply::text(format!(
            "{}{}",
            self.prefix,
            request.message.text.trim()
        )))
    }

    fn name(&self) -> &str {
        "echo"
    }
}
