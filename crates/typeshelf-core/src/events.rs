//! # Event Publisher
//!
//! Synchronous publish/subscribe used by every catalog entity.
//!
//! Handlers run on the publishing thread, in subscription order. The handler
//! list is snapshotted before dispatch, so a handler may subscribe,
//! unsubscribe or publish again without deadlocking.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Identifies one subscription so it can be removed later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Handler<E> = Arc<dyn Fn(&E) + Send + Sync>;

/// A list of handlers interested in events of type `E`.
pub struct EventPublisher<E> {
    next_id: AtomicU64,
    handlers: Mutex<Vec<(SubscriptionId, Handler<E>)>>,
}

impl<E> EventPublisher<E> {
    /// Creates a publisher with no subscribers.
    pub fn new() -> Self {
        EventPublisher {
            next_id: AtomicU64::new(1),
            handlers: Mutex::new(Vec::new()),
        }
    }

    /// Registers a handler and returns its subscription id.
    pub fn subscribe<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.lock().push((id, Arc::new(handler)));
        id
    }

    /// Removes a handler. Returns false if the id was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut handlers = self.lock();
        let before = handlers.len();
        handlers.retain(|(existing, _)| *existing != id);
        handlers.len() != before
    }

    /// Delivers `event` to every current subscriber.
    pub fn publish(&self, event: &E) {
        let snapshot: Vec<Handler<E>> = self
            .lock()
            .iter()
            .map(|(_, handler)| handler.clone())
            .collect();

        for handler in snapshot {
            handler(event);
        }
    }

    /// Number of registered handlers.
    pub fn subscriber_count(&self) -> usize {
        self.lock().len()
    }

    /// Drops every handler.
    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> MutexGuard<'_, Vec<(SubscriptionId, Handler<E>)>> {
        self.handlers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<E> Default for EventPublisher<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> fmt::Debug for EventPublisher<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventPublisher")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_publish_reaches_all_subscribers() {
        let publisher = EventPublisher::<u32>::new();
        let total = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let total = total.clone();
            publisher.subscribe(move |value| {
                total.fetch_add(*value as usize, Ordering::SeqCst);
            });
        }

        publisher.publish(&2);
        assert_eq!(total.load(Ordering::SeqCst), 6);
    }

    #[test]
    fn test_unsubscribe_stops_delivery() {
        let publisher = EventPublisher::<()>::new();
        let hits = Arc::new(AtomicUsize::new(0));

        let counter = hits.clone();
        let id = publisher.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        publisher.publish(&());
        assert!(publisher.unsubscribe(id));
        assert!(!publisher.unsubscribe(id));
        publisher.publish(&());

        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(publisher.subscriber_count(), 0);
    }

    #[test]
    fn test_handler_can_republish_without_deadlock() {
        let publisher = Arc::new(EventPublisher::<u8>::new());
        let seen = Arc::new(Mutex::new(Vec::new()));

        let inner = publisher.clone();
        let log = seen.clone();
        publisher.subscribe(move |value| {
            log.lock().unwrap().push(*value);
            if *value == 0 {
                inner.publish(&1);
            }
        });

        publisher.publish(&0);
        assert_eq!(*seen.lock().unwrap(), vec![0, 1]);
    }
}
