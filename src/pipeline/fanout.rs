//! Subscriber registry
//!
//! Subscribers are shared handles so the caller keeps access to their state
//! after a run. Identity is the handle's allocation: attaching the same handle
//! twice is a no-op.

use {
    crate::types::Event,
    std::sync::{Arc, Mutex},
};

/// Receives every event the pipeline accepts
pub trait Subscriber {
    fn consume(&mut self, event: &Event);
}

pub type SharedSubscriber = Arc<Mutex<dyn Subscriber + Send>>;

/// Wrap a subscriber into a shareable handle
pub fn shared<S: Subscriber + Send>(subscriber: S) -> Arc<Mutex<S>> {
    Arc::new(Mutex::new(subscriber))
}

fn same_handle<S: ?Sized>(a: &SharedSubscriber, b: &Arc<Mutex<S>>) -> bool {
    std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}

#[derive(Default)]
pub struct SubscriberRegistry {
    subscribers: Vec<SharedSubscriber>,
}

impl SubscriberRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false when the handle was already attached
    pub fn attach(&mut self, subscriber: SharedSubscriber) -> bool {
        if self.subscribers.iter().any(|s| same_handle(s, &subscriber)) {
            return false;
        }
        self.subscribers.push(subscriber);
        true
    }

    /// Returns false when the handle was not attached
    pub fn detach<S>(&mut self, subscriber: &Arc<Mutex<S>>) -> bool
    where
        S: Subscriber + Send + ?Sized,
    {
        let before = self.subscribers.len();
        self.subscribers.retain(|s| !same_handle(s, subscriber));
        self.subscribers.len() != before
    }

    pub fn contains<S>(&self, subscriber: &Arc<Mutex<S>>) -> bool
    where
        S: Subscriber + Send + ?Sized,
    {
        self.subscribers.iter().any(|s| same_handle(s, subscriber))
    }

    /// Deliver `event` to every attached subscriber before returning
    pub fn notify(&self, event: &Event) {
        for subscriber in &self.subscribers {
            // a panic inside another consume() leaves the state usable
            let mut guard = subscriber.lock().unwrap_or_else(|e| e.into_inner());
            guard.consume(event);
        }
    }

    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }

    pub fn clear(&mut self) {
        self.subscribers.clear();
    }
}

impl std::fmt::Debug for SubscriberRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriberRegistry")
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}
