//! Engine error taxonomy

use crate::message::{MessageId, MessageStatus};
use crate::transport::TransportError;
use thiserror::Error;

/// Violations of the conversation invariants enforced by the store.
///
/// None of these should occur in normal operation; when one reaches the
/// rendering layer it is shown as a generic failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("Message not found: {0}")]
    NotFound(MessageId),
    #[error("Duplicate message id: {0}")]
    DuplicateId(MessageId),
    #[error("Invalid status transition for {id}: {from} -> {to}")]
    InvalidTransition {
        id: MessageId,
        from: MessageStatus,
        to: MessageStatus,
    },
    #[error("Message {0} is already pending")]
    AlreadyPending(MessageId),
    #[error("Store is closed")]
    Closed,
}

/// Errors returned to callers of the session
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Invalid message: {0}")]
    Validation(String),
    #[error("A message is already being sent")]
    Busy,
    #[error("Delivery failed after {attempts} attempt(s): {source}")]
    Delivery {
        attempts: u32,
        #[source]
        source: TransportError,
    },
    #[error("Session is closed")]
    Closed,
    #[error(transparent)]
    Store(StoreError),
}

pub type SessionResult<T> = Result<T, SessionError>;

const GENERIC_FAILURE: &str = "Something went wrong. Please try again.";

impl SessionError {
    /// Internal invariant violation rather than a user or delivery problem
    pub fn is_internal(&self) -> bool {
        matches!(self, SessionError::Store(_))
    }

    /// Text suitable for a banner in the rendering layer
    pub fn user_message(&self) -> String {
        match self {
            SessionError::Store(_) => GENERIC_FAILURE.to_string(),
            other => other.to_string(),
        }
    }

    /// Underlying transport failure, if delivery was the problem
    pub fn transport_error(&self) -> Option<&TransportError> {
        match self {
            SessionError::Delivery { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<StoreError> for SessionError {
    fn from(err: StoreError) -> Self {
        match err {
            // A closed store means the session was torn down underneath us
            StoreError::Closed => SessionError::Closed,
            other => SessionError::Store(other),
        }
    }
}
