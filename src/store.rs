//! Ordered message history for one conversation
//!
//! The store is the only place the conversation sequence is mutated. Every
//! successful mutation is reported to the optional [`StoreObserver`] after
//! the internal lock has been released, so observers may read the store
//! from inside the callback.

use crate::error::StoreError;
use crate::message::{Message, MessageId, MessageStatus};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// A completed store mutation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    Appended(Message),
    StatusChanged {
        message: Message,
        from: MessageStatus,
    },
}

impl StoreEvent {
    /// The message as it looks after the mutation
    pub fn message(&self) -> &Message {
        match self {
            StoreEvent::Appended(message) | StoreEvent::StatusChanged { message, .. } => message,
        }
    }
}

/// Receives every successful store mutation, synchronously
pub trait StoreObserver: Send + Sync {
    fn on_change(&self, event: &StoreEvent);
}

#[derive(Default)]
struct Conversation {
    messages: Vec<Message>,
    index: HashMap<MessageId, usize>,
    closed: bool,
}

impl Conversation {
    fn pending(&self) -> Option<&Message> {
        self.messages.iter().rev().find(|m| m.is_pending())
    }
}

/// In-memory conversation history
#[derive(Default)]
pub struct MessageStore {
    inner: RwLock<Conversation>,
    observer: Option<Arc<dyn StoreObserver>>,
}

impl MessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_observer(observer: Arc<dyn StoreObserver>) -> Self {
        Self {
            inner: RwLock::default(),
            observer: Some(observer),
        }
    }

    /// Insert at the end of the conversation.
    ///
    /// Rejects a second `pending` message so the single-flight invariant
    /// holds even if a caller bypasses the session.
    pub fn append(&self, message: Message) -> Result<MessageId, StoreError> {
        let id = message.id;
        {
            let mut conv = self.write();
            if conv.closed {
                return Err(StoreError::Closed);
            }
            if conv.index.contains_key(&id) {
                return Err(StoreError::DuplicateId(id));
            }
            if message.is_pending() {
                if let Some(existing) = conv.pending() {
                    return Err(StoreError::AlreadyPending(existing.id));
                }
            }
            let position = conv.messages.len();
            conv.messages.push(message.clone());
            conv.index.insert(id, position);
        }

        tracing::debug!(message_id = %id, role = %message.role, status = %message.status, "Message appended");
        self.notify(&StoreEvent::Appended(message));
        Ok(id)
    }

    /// Move a message out of `pending`. Returns the updated message.
    pub fn update_status(
        &self,
        id: MessageId,
        new_status: MessageStatus,
    ) -> Result<Message, StoreError> {
        let (updated, from) = {
            let mut conv = self.write();
            if conv.closed {
                return Err(StoreError::Closed);
            }
            let position = *conv.index.get(&id).ok_or(StoreError::NotFound(id))?;
            let message = conv
                .messages
                .get_mut(position)
                .ok_or(StoreError::NotFound(id))?;
            let from = message.status;
            if !from.can_transition_to(new_status) {
                return Err(StoreError::InvalidTransition {
                    id,
                    from,
                    to: new_status,
                });
            }
            message.status = new_status;
            (message.clone(), from)
        };

        tracing::debug!(message_id = %id, %from, to = %new_status, "Message status updated");
        self.notify(&StoreEvent::StatusChanged {
            message: updated.clone(),
            from,
        });
        Ok(updated)
    }

    /// Snapshot of the whole conversation in insertion order
    pub fn all(&self) -> Vec<Message> {
        self.read().messages.clone()
    }

    pub fn get(&self, id: MessageId) -> Option<Message> {
        let conv = self.read();
        conv.index
            .get(&id)
            .and_then(|&position| conv.messages.get(position))
            .cloned()
    }

    /// The in-flight message, if any
    pub fn pending(&self) -> Option<Message> {
        self.read().pending().cloned()
    }

    pub fn len(&self) -> usize {
        self.read().messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().messages.is_empty()
    }

    /// Reject all further mutations. Reads keep working.
    pub fn close(&self) {
        self.write().closed = true;
    }

    pub fn is_closed(&self) -> bool {
        self.read().closed
    }

    fn notify(&self, event: &StoreEvent) {
        if let Some(observer) = &self.observer {
            observer.on_change(event);
        }
    }

    // A panic while holding the lock cannot leave the conversation half
    // written: every mutation validates before touching any field.
    fn read(&self) -> RwLockReadGuard<'_, Conversation> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Conversation> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}
