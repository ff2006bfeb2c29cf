//! Send pipeline
//!
//! Validates outgoing text, records it as an optimistic `pending` entry,
//! drives delivery through the [`Transport`] with retry, and reconciles the
//! entry to `sent` or `failed`.

pub mod retry;

pub use retry::RetryPolicy;

use crate::error::{SessionError, SessionResult, StoreError};
use crate::message::{Message, MessageId, MessageStatus, MonotonicClock};
use crate::store::MessageStore;
use crate::transport::{DeliveryReply, DeliveryRequest, Transport, TransportError};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub const DEFAULT_MAX_MESSAGE_CHARS: usize = 32_000;

/// Outcome of a successful dispatch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivered {
    /// The user message, now `sent`
    pub message: Message,
    /// Assistant reply recorded after it, if the receiver sent one
    pub reply: Option<Message>,
    pub attempts: u32,
}

enum AttemptFailure {
    Cancelled,
    Failed { attempts: u32, error: TransportError },
}

pub struct SendPipeline<T: Transport> {
    store: Arc<MessageStore>,
    transport: T,
    policy: RetryPolicy,
    clock: Arc<MonotonicClock>,
    max_message_chars: usize,
}

impl<T: Transport> SendPipeline<T> {
    pub fn new(store: Arc<MessageStore>, transport: T) -> Self {
        Self {
            store,
            transport,
            policy: RetryPolicy::default(),
            clock: Arc::new(MonotonicClock::new()),
            max_message_chars: DEFAULT_MAX_MESSAGE_CHARS,
        }
    }

    #[must_use]
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy.normalized();
        self
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<MonotonicClock>) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn with_max_message_chars(mut self, max: usize) -> Self {
        self.max_message_chars = max;
        self
    }

    pub fn store(&self) -> &Arc<MessageStore> {
        &self.store
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn validate(&self, text: &str) -> SessionResult<()> {
        if text.trim().is_empty() {
            return Err(SessionError::Validation(
                "message text is empty".to_string(),
            ));
        }
        let chars = text.chars().count();
        if chars > self.max_message_chars {
            return Err(SessionError::Validation(format!(
                "message is {chars} characters, limit is {}",
                self.max_message_chars
            )));
        }
        Ok(())
    }

    /// Validate, record and deliver `text`.
    ///
    /// Once `cancel` fires the pipeline stops at the next suspension point
    /// and leaves the store untouched from then on.
    pub async fn dispatch(
        &self,
        text: &str,
        cancel: &CancellationToken,
    ) -> SessionResult<Delivered> {
        self.validate(text)?;
        if cancel.is_cancelled() {
            return Err(SessionError::Closed);
        }

        let history: Vec<Message> = self
            .store
            .all()
            .into_iter()
            .filter(|m| m.status == MessageStatus::Sent)
            .collect();

        let message = Message::user(text, self.clock.now());
        let id = self.store.append(message.clone()).map_err(internal)?;
        tracing::info!(message_id = %id, chars = text.chars().count(), "Dispatching message");

        let mut guard = PendingGuard::new(&self.store, id, cancel);
        let outcome = self.deliver_with_retry(&message, history, cancel).await;
        guard.disarm();

        match outcome {
            Ok((reply, attempts)) => {
                let message = self
                    .store
                    .update_status(id, MessageStatus::Sent)
                    .map_err(internal)?;
                let reply = match reply.into_text() {
                    Some(text) => {
                        let reply = Message::assistant(text, self.clock.now());
                        match self.store.append(reply.clone()) {
                            Ok(_) => Some(reply),
                            // Closed after the user message was marked sent
                            Err(StoreError::Closed) => {
                                tracing::debug!(message_id = %id, "Store closed, dropping reply");
                                None
                            }
                            Err(e) => return Err(internal(e)),
                        }
                    }
                    None => None,
                };
                tracing::info!(message_id = %id, attempts, has_reply = reply.is_some(), "Message sent");
                Ok(Delivered {
                    message,
                    reply,
                    attempts,
                })
            }
            Err(AttemptFailure::Cancelled) => {
                tracing::info!(message_id = %id, "Dispatch abandoned, session closed");
                Err(SessionError::Closed)
            }
            Err(AttemptFailure::Failed { attempts, error }) => {
                self.store
                    .update_status(id, MessageStatus::Failed)
                    .map_err(internal)?;
                tracing::warn!(
                    message_id = %id,
                    attempts,
                    error = %error,
                    transient = error.is_transient(),
                    "Message delivery failed"
                );
                Err(SessionError::Delivery {
                    attempts,
                    source: error,
                })
            }
        }
    }

    async fn deliver_with_retry(
        &self,
        message: &Message,
        history: Vec<Message>,
        cancel: &CancellationToken,
    ) -> Result<(DeliveryReply, u32), AttemptFailure> {
        let mut request = DeliveryRequest {
            message: message.clone(),
            attempt: 0,
            history,
        };

        loop {
            request.attempt += 1;
            let attempt = request.attempt;

            let result = tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(AttemptFailure::Cancelled),
                result = self.transport.deliver(&request) => result,
            };

            match result {
                Ok(reply) => return Ok((reply, attempt)),
                Err(error) if self.policy.should_retry(attempt, &error) => {
                    let delay = self.policy.next_delay(attempt, &error);
                    tracing::debug!(
                        message_id = %message.id,
                        attempt,
                        delay_ms = %delay.as_millis(),
                        error = %error,
                        "Transient delivery failure, retrying"
                    );
                    tokio::select! {
                        biased;
                        () = cancel.cancelled() => return Err(AttemptFailure::Cancelled),
                        () = tokio::time::sleep(delay) => {}
                    }
                }
                Err(error) => {
                    return Err(AttemptFailure::Failed {
                        attempts: attempt,
                        error,
                    });
                }
            }
        }
    }
}

/// Store errors other than `Closed` mean an invariant broke
fn internal(err: StoreError) -> SessionError {
    if err != StoreError::Closed {
        tracing::error!(error = %err, "Conversation invariant violated");
    }
    err.into()
}

/// Marks the pending message `failed` if the dispatch future is dropped
/// mid-flight while the session is still live.
struct PendingGuard<'a> {
    store: &'a MessageStore,
    id: MessageId,
    cancel: &'a CancellationToken,
    armed: bool,
}

impl<'a> PendingGuard<'a> {
    fn new(store: &'a MessageStore, id: MessageId, cancel: &'a CancellationToken) -> Self {
        Self {
            store,
            id,
            cancel,
            armed: true,
        }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        if !self.armed || self.cancel.is_cancelled() {
            return;
        }
        tracing::warn!(message_id = %self.id, "Dispatch dropped in flight, marking message failed");
        if let Err(e) = self.store.update_status(self.id, MessageStatus::Failed) {
            tracing::debug!(message_id = %self.id, error = %e, "Could not mark dropped message failed");
        }
    }
}
