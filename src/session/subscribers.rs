//! Observer list for store changes
//!
//! Callbacks run synchronously, in registration order, on the thread that
//! performed the mutation. A panicking callback is logged and skipped; it
//! never reaches the mutating code or the other callbacks.

use crate::store::{StoreEvent, StoreObserver};
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

pub type Callback = Arc<dyn Fn(&StoreEvent) + Send + Sync>;

#[derive(Default)]
pub struct Subscribers {
    next_id: AtomicU64,
    entries: Mutex<Vec<(u64, Callback)>>,
    closed: AtomicBool,
}

impl Subscribers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add<F>(self: &Arc<Self>, callback: F) -> Subscription
    where
        F: Fn(&StoreEvent) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.entries().push((id, Arc::new(callback)));
        tracing::debug!(subscriber = id, "Subscriber added");
        Subscription {
            id,
            subscribers: Arc::downgrade(self),
        }
    }

    fn remove(&self, id: u64) -> bool {
        let mut entries = self.entries();
        let before = entries.len();
        entries.retain(|(entry_id, _)| *entry_id != id);
        before != entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    pub fn clear(&self) {
        self.entries().clear();
    }

    /// Drop every callback and ignore later events. A callback already
    /// running on another thread is allowed to finish.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.clear();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn notify(&self, event: &StoreEvent) {
        if self.is_closed() {
            return;
        }
        // Snapshot so callbacks can subscribe or unsubscribe re-entrantly
        let callbacks: Vec<(u64, Callback)> = self
            .entries()
            .iter()
            .map(|(id, callback)| (*id, Arc::clone(callback)))
            .collect();

        for (id, callback) in callbacks {
            if self.is_closed() {
                break;
            }
            if let Err(payload) = catch_unwind(AssertUnwindSafe(|| callback(event))) {
                tracing::error!(
                    subscriber = id,
                    panic = %panic_message(payload.as_ref()),
                    "Subscriber callback panicked"
                );
            }
        }
    }

    fn entries(&self) -> MutexGuard<'_, Vec<(u64, Callback)>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl StoreObserver for Subscribers {
    fn on_change(&self, event: &StoreEvent) {
        self.notify(event);
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        *s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}

/// Handle returned by `subscribe`
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    subscribers: Weak<Subscribers>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Stop receiving events. Returns `false` if already gone.
    pub fn unsubscribe(self) -> bool {
        self.subscribers
            .upgrade()
            .is_some_and(|subscribers| subscribers.remove(self.id))
    }
}
