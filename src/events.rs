//! Observer registration over `mpsc` channels.

use std::sync::mpsc::{self, Receiver, Sender};

/// Fans one stream of events out to every live subscriber, in emit order.
#[derive(Debug)]
pub struct Broadcaster<T> {
    subscribers: Vec<Sender<T>>,
}

impl<T> Default for Broadcaster<T> {
    fn default() -> Self {
        Self {
            subscribers: Vec::new(),
        }
    }
}

impl<T: Clone> Broadcaster<T> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new observer. Dropping the receiver unsubscribes it.
    pub fn subscribe(&mut self) -> Receiver<T> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.push(tx);
        rx
    }

    /// Deliver `event` to every subscriber, forgetting the ones that hung up.
    pub fn emit(&mut self, event: T) {
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}
