//! Mock implementations for testing
//!
//! These mocks let the pipeline and session be exercised without real I/O.

use crate::transport::{DeliveryReply, DeliveryRequest, Transport, TransportError};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

type Outcome = Result<DeliveryReply, TransportError>;

// ============================================================================
// Mock Transport
// ============================================================================

/// Mock transport that returns queued outcomes, then a fallback
pub struct MockTransport {
    outcomes: Mutex<VecDeque<Outcome>>,
    fallback: Option<Outcome>,
    /// Record of all requests made
    pub requests: Mutex<Vec<DeliveryRequest>>,
}

#[allow(dead_code)]
impl MockTransport {
    pub fn new() -> Self {
        Self {
            outcomes: Mutex::new(VecDeque::new()),
            fallback: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Every attempt succeeds with `reply`
    pub fn always_ok(reply: DeliveryReply) -> Self {
        Self {
            fallback: Some(Ok(reply)),
            ..Self::new()
        }
    }

    /// Every attempt fails with `error`
    pub fn always_failing(error: TransportError) -> Self {
        Self {
            fallback: Some(Err(error)),
            ..Self::new()
        }
    }

    pub fn queue_reply(&self, reply: DeliveryReply) {
        self.outcomes.lock().unwrap().push_back(Ok(reply));
    }

    pub fn queue_error(&self, error: TransportError) {
        self.outcomes.lock().unwrap().push_back(Err(error));
    }

    pub fn recorded_requests(&self) -> Vec<DeliveryRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn attempts(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    fn next_outcome(&self) -> Outcome {
        self.outcomes
            .lock()
            .unwrap()
            .pop_front()
            .or_else(|| self.fallback.clone())
            .unwrap_or_else(|| Err(TransportError::network("No mock outcome queued")))
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn deliver(&self, request: &DeliveryRequest) -> Result<DeliveryReply, TransportError> {
        self.requests.lock().unwrap().push(request.clone());
        self.next_outcome()
    }

    fn name(&self) -> &str {
        "mock"
    }
}

// ============================================================================
// Delayed Mock Transport (for cancellation and busy testing)
// ============================================================================

/// Mock transport that sleeps before answering
pub struct DelayedMockTransport {
    inner: MockTransport,
    delay: Duration,
    /// Notified when a delivery starts (for test synchronization)
    pub started: Arc<Notify>,
}

#[allow(dead_code)]
impl DelayedMockTransport {
    pub fn new(delay: Duration) -> Self {
        Self {
            inner: MockTransport::always_ok(DeliveryReply::empty()),
            delay,
            started: Arc::new(Notify::new()),
        }
    }

    pub fn queue_reply(&self, reply: DeliveryReply) {
        self.inner.queue_reply(reply);
    }

    pub fn queue_error(&self, error: TransportError) {
        self.inner.queue_error(error);
    }

    pub fn attempts(&self) -> usize {
        self.inner.attempts()
    }
}

#[async_trait]
impl Transport for DelayedMockTransport {
    async fn deliver(&self, request: &DeliveryRequest) -> Result<DeliveryReply, TransportError> {
        self.inner.requests.lock().unwrap().push(request.clone());
        // notify_one keeps a permit if nobody is waiting yet
        self.started.notify_one();
        tokio::time::sleep(self.delay).await;
        self.inner.next_outcome()
    }

    fn name(&self) -> &str {
        "delayed-mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{Message, Timestamp};

    fn request() -> DeliveryRequest {
        DeliveryRequest {
            message: Message::user("ping", Timestamp::default()),
            attempt: 1,
            history: vec![],
        }
    }

    #[tokio::test]
    async fn test_queue_then_fallback() {
        let mock = MockTransport::always_ok(DeliveryReply::text("fallback"));
        mock.queue_error(TransportError::network("first"));

        assert!(mock.deliver(&request()).await.is_err());
        assert_eq!(
            mock.deliver(&request()).await.unwrap(),
            DeliveryReply::text("fallback")
        );
        assert_eq!(mock.attempts(), 2);
    }

    #[tokio::test]
    async fn test_empty_mock_fails_transiently() {
        let mock = MockTransport::new();
        let err = mock.deliver(&request()).await.unwrap_err();
        assert!(err.is_transient());
    }
}
