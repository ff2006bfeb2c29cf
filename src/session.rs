//! Session controller
//!
//! The single entry point for the rendering layer. A [`Session`] owns one
//! conversation, enforces single-flight sends and fans store changes out
//! to subscribers.

pub mod subscribers;

#[cfg(test)]
mod proptests;

pub use subscribers::{Subscribers, Subscription};

use crate::config::EngineConfig;
use crate::error::{SessionError, SessionResult};
use crate::message::{Message, MonotonicClock};
use crate::pipeline::{Delivered, RetryPolicy, SendPipeline, DEFAULT_MAX_MESSAGE_CHARS};
use crate::store::{MessageStore, StoreEvent};
use crate::transport::Transport;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub struct Session<T: Transport> {
    pipeline: SendPipeline<T>,
    subscribers: Arc<Subscribers>,
    in_flight: AtomicBool,
    cancel: CancellationToken,
}

impl<T: Transport> Session<T> {
    /// Assemble a session from parts built by the caller.
    ///
    /// `subscribers` only sees changes if it is the observer of the
    /// pipeline's store; [`Session::builder`] wires that up.
    pub fn new(pipeline: SendPipeline<T>, subscribers: Arc<Subscribers>) -> Self {
        Self {
            pipeline,
            subscribers,
            in_flight: AtomicBool::new(false),
            cancel: CancellationToken::new(),
        }
    }

    pub fn builder(transport: T) -> SessionBuilder<T> {
        SessionBuilder::new(transport)
    }

    pub fn with_transport(transport: T, config: &EngineConfig) -> Self {
        Self::builder(transport).config(config).build()
    }

    /// Send `text` and wait until it is `sent` or `failed`.
    ///
    /// Fails with [`SessionError::Busy`] without touching history if
    /// another send is still in flight.
    pub async fn send_message(&self, text: &str) -> SessionResult<Delivered> {
        if self.cancel.is_cancelled() {
            return Err(SessionError::Closed);
        }
        let Some(_flight) = FlightGuard::acquire(&self.in_flight) else {
            tracing::debug!("Rejecting send, another message is in flight");
            return Err(SessionError::Busy);
        };
        if let Some(pending) = self.pipeline.store().pending() {
            tracing::warn!(message_id = %pending.id, "Rejecting send, store holds a pending message");
            return Err(SessionError::Busy);
        }

        let result = self.pipeline.dispatch(text, &self.cancel).await;
        if let Err(e) = &result {
            if e.is_internal() {
                tracing::error!(error = %e, "Send failed with internal error");
            }
        }
        result
    }

    /// Snapshot of the conversation in order
    pub fn history(&self) -> Vec<Message> {
        self.pipeline.store().all()
    }

    /// Call `callback` after every change to the conversation
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&StoreEvent) + Send + Sync + 'static,
    {
        self.subscribers.add(callback)
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    pub fn store(&self) -> &Arc<MessageStore> {
        self.pipeline.store()
    }

    pub fn pipeline(&self) -> &SendPipeline<T> {
        &self.pipeline
    }

    /// Tear the session down.
    ///
    /// Abandons any in-flight dispatch. Once this returns the conversation
    /// is never mutated again and no new subscriber call starts. A callback
    /// already running on another thread may still finish.
    pub fn shutdown(&self) {
        if self.cancel.is_cancelled() {
            return;
        }
        tracing::info!(
            messages = self.pipeline.store().len(),
            in_flight = self.is_busy(),
            "Shutting down session"
        );
        self.cancel.cancel();
        self.subscribers.close();
        self.pipeline.store().close();
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl<T: Transport> Drop for Session<T> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Clears the in-flight flag however the send ends
struct FlightGuard<'a>(&'a AtomicBool);

impl<'a> FlightGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Wires store, pipeline and subscriber list together
pub struct SessionBuilder<T: Transport> {
    transport: T,
    policy: RetryPolicy,
    max_message_chars: usize,
}

impl<T: Transport> SessionBuilder<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            policy: RetryPolicy::default(),
            max_message_chars: DEFAULT_MAX_MESSAGE_CHARS,
        }
    }

    #[must_use]
    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    #[must_use]
    pub fn max_message_chars(mut self, max: usize) -> Self {
        self.max_message_chars = max;
        self
    }

    #[must_use]
    pub fn config(self, config: &EngineConfig) -> Self {
        self.retry_policy(config.retry.clone())
            .max_message_chars(config.max_message_chars)
    }

    pub fn build(self) -> Session<T> {
        let subscribers = Arc::new(Subscribers::new());
        let store = Arc::new(MessageStore::with_observer(subscribers.clone()));
        let pipeline = SendPipeline::new(store, self.transport)
            .with_policy(self.policy)
            .with_clock(Arc::new(MonotonicClock::new()))
            .with_max_message_chars(self.max_message_chars);
        Session::new(pipeline, subscribers)
    }
}
