//! Conversation data model
//!
//! A [`Message`] is immutable once recorded except for its [`MessageStatus`],
//! which moves from `Pending` to exactly one of `Sent` or `Failed`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use uuid::Uuid;

/// Opaque unique message identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(Uuid);

impl MessageId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Who authored a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Delivery status of a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    Pending,
    Sent,
    Failed,
}

impl MessageStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            MessageStatus::Pending => "pending",
            MessageStatus::Sent => "sent",
            MessageStatus::Failed => "failed",
        }
    }

    /// `Sent` and `Failed` are final.
    pub fn is_terminal(self) -> bool {
        !matches!(self, MessageStatus::Pending)
    }

    /// Only `pending -> sent` and `pending -> failed` are legal.
    pub fn can_transition_to(self, next: MessageStatus) -> bool {
        matches!(
            (self, next),
            (MessageStatus::Pending, MessageStatus::Sent | MessageStatus::Failed)
        )
    }
}

impl fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Monotonic timestamp in microseconds since the owning clock's epoch
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Timestamp(u64);

impl Timestamp {
    pub fn from_micros(micros: u64) -> Self {
        Self(micros)
    }

    pub fn as_micros(self) -> u64 {
        self.0
    }

    pub fn as_duration(self) -> Duration {
        Duration::from_micros(self.0)
    }
}

/// Source of strictly increasing [`Timestamp`]s.
///
/// Two calls never return the same value, so timestamps sort the same way
/// messages were recorded even when the underlying clock has coarse
/// resolution. Built on `tokio::time::Instant` so paused test time applies.
#[derive(Debug)]
pub struct MonotonicClock {
    epoch: Instant,
    last: Mutex<Option<u64>>,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
            last: Mutex::new(None),
        }
    }

    pub fn now(&self) -> Timestamp {
        let elapsed = u64::try_from(self.epoch.elapsed().as_micros()).unwrap_or(u64::MAX);
        let mut last = self.last.lock().unwrap_or_else(PoisonError::into_inner);
        let next = match *last {
            Some(prev) if elapsed <= prev => prev.saturating_add(1),
            _ => elapsed,
        };
        *last = Some(next);
        Timestamp(next)
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

/// A single entry in a conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub role: Role,
    pub text: String,
    pub status: MessageStatus,
    pub created_at: Timestamp,
}

impl Message {
    pub fn new(
        role: Role,
        text: impl Into<String>,
        status: MessageStatus,
        created_at: Timestamp,
    ) -> Self {
        Self {
            id: MessageId::new(),
            role,
            text: text.into(),
            status,
            created_at,
        }
    }

    /// Optimistic user entry, recorded before delivery is confirmed
    pub fn user(text: impl Into<String>, created_at: Timestamp) -> Self {
        Self::new(Role::User, text, MessageStatus::Pending, created_at)
    }

    /// Reply content returned by the receiver; already delivered
    pub fn assistant(text: impl Into<String>, created_at: Timestamp) -> Self {
        Self::new(Role::Assistant, text, MessageStatus::Sent, created_at)
    }

    pub fn is_pending(&self) -> bool {
        self.status == MessageStatus::Pending
    }
}
