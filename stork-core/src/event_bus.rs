//! Fan-out of [`crate::model::Event`] to SSE subscribers. Each subscriber
//! gets its own bounded mailbox; a publisher never blocks on a slow
//! subscriber, and one whose backlog exceeds [`EventBus::BACKLOG_LIMIT`]
//! is disconnected outright rather than left to grow without bound.

use std::sync::{Arc, Mutex};

use crossbeam::channel::{bounded, Receiver, Sender};

use crate::model::Event;

#[derive(Debug, Clone)]
pub struct EventBus {
    subscribers: Arc<Mutex<Vec<Sender<Event>>>>,
    backlog_limit: usize,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_backlog_limit(Self::BACKLOG_LIMIT)
    }
}

impl EventBus {
    /// Mailbox capacity before a subscriber is treated as slow and dropped.
    pub const BACKLOG_LIMIT: usize = 1024;

    pub fn with_backlog_limit(backlog_limit: usize) -> Self {
        Self {
            subscribers: Arc::new(Mutex::new(Vec::new())),
            backlog_limit,
        }
    }

    pub fn subscribe(&self) -> Receiver<Event> {
        let (tx, rx) = bounded(self.backlog_limit);
        self.subscribers
            .lock()
            .expect("event bus subscriber lock poisoned")
            .push(tx);
        rx
    }

    /// Never blocks and never fails: subscribers that are gone or whose
    /// backlog is full are dropped from the list rather than surfaced as
    /// an error to the publisher.
    pub fn publish(&self, event: Event) {
        self.subscribers
            .lock()
            .expect("event bus subscriber lock poisoned")
            .retain(|s| s.try_send(event.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .lock()
            .expect("event bus subscriber lock poisoned")
            .len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Event;
    use chrono::Utc;

    fn sample_event(text: &str) -> Event {
        Event::info(1, Utc::now(), text)
    }

    #[test]
    fn delivers_to_all_subscribers() {
        let bus = EventBus::default();
        let a = bus.subscribe();
        let b = bus.subscribe();

        bus.publish(sample_event("hello"));

        assert_eq!(a.recv().unwrap().text, "hello");
        assert_eq!(b.recv().unwrap().text, "hello");
    }

    #[test]
    fn drops_disconnected_subscribers() {
        let bus = EventBus::default();
        let keep = bus.subscribe();
        let drop_me = bus.subscribe();
        drop(drop_me);

        bus.publish(sample_event("still works"));
        assert_eq!(bus.subscriber_count(), 1);
        assert_eq!(keep.recv().unwrap().text, "still works");
    }

    #[test]
    fn clone_shares_subscriber_list() {
        let bus = EventBus::default();
        let clone = bus.clone();
        let sub = bus.subscribe();

        clone.publish(sample_event("from clone"));
        assert_eq!(sub.recv().unwrap().text, "from clone");
    }

    #[test]
    fn disconnects_subscriber_whose_backlog_is_full() {
        let bus = EventBus::with_backlog_limit(2);
        let slow = bus.subscribe();

        bus.publish(sample_event("one"));
        bus.publish(sample_event("two"));
        assert_eq!(bus.subscriber_count(), 1);

        // Mailbox is now full; the next publish finds `try_send` failing
        // and drops the subscriber rather than blocking or growing the
        // queue further.
        bus.publish(sample_event("three"));
        assert_eq!(bus.subscriber_count(), 0);

        // Already-buffered events are still delivered; memory stays
        // bounded by the mailbox capacity, not the subscriber's speed.
        assert_eq!(slow.recv().unwrap().text, "one");
        assert_eq!(slow.recv().unwrap().text, "two");
    }
}
