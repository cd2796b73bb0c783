//! Explicit publish/subscribe channel for cross-view notifications.
//!
//! Publishers call [`Subject::publish`] at well-defined points (a profile
//! update, for instance). Views hold a [`Subscription`] for as long as they
//! are mounted; dropping it unsubscribes.

use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};

const DEFAULT_CAPACITY: usize = 16;

/// Multi-subscriber broadcast of `T` values.
#[derive(Debug, Clone)]
pub struct Subject<T: Clone> {
    sender: broadcast::Sender<T>,
}

impl<T: Clone + Send + 'static> Default for Subject<T> {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl<T: Clone + Send + 'static> Subject<T> {
    /// `capacity` bounds how many unread values a slow subscriber may lag.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Deliver `value` to every live subscriber; returns how many there were.
    pub fn publish(&self, value: T) -> usize {
        self.sender.send(value).unwrap_or(0)
    }

    /// Start receiving values published from now on.
    pub fn subscribe(&self) -> Subscription<T> {
        Subscription {
            receiver: self.sender.subscribe(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

/// A live subscription. Dropping it unsubscribes.
#[derive(Debug)]
pub struct Subscription<T: Clone> {
    receiver: broadcast::Receiver<T>,
}

impl<T: Clone> Subscription<T> {
    /// Wait for the next value. `None` once every publisher is gone.
    ///
    /// A subscriber that fell behind skips the values it missed.
    pub async fn next(&mut self) -> Option<T> {
        loop {
            match self.receiver.recv().await {
                Ok(value) => return Some(value),
                Err(RecvError::Lagged(missed)) => {
                    log::warn!("subscriber lagged, skipped {} events", missed);
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Non-blocking variant of [`Subscription::next`].
    pub fn try_next(&mut self) -> Option<T> {
        loop {
            match self.receiver.try_recv() {
                Ok(value) => return Some(value),
                Err(TryRecvError::Lagged(_)) => continue,
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_reaches_every_subscriber() {
        let subject = Subject::default();
        let mut a = subject.subscribe();
        let mut b = subject.subscribe();

        assert_eq!(subject.publish("perfil"), 2);
        assert_eq!(a.try_next(), Some("perfil"));
        assert_eq!(b.try_next(), Some("perfil"));
        assert_eq!(a.try_next(), None);
    }

    #[test]
    fn dropping_a_subscription_unsubscribes() {
        let subject: Subject<u32> = Subject::new(4);
        let first = subject.subscribe();
        let _second = subject.subscribe();
        assert_eq!(subject.subscriber_count(), 2);

        drop(first);
        assert_eq!(subject.subscriber_count(), 1);
        assert_eq!(subject.publish(7), 1);
    }

    #[test]
    fn publishing_without_subscribers_is_a_no_op() {
        let subject: Subject<u32> = Subject::default();
        assert_eq!(subject.publish(1), 0);

        let mut late = subject.subscribe();
        assert_eq!(late.try_next(), None);
    }

    #[tokio::test]
    async fn next_ends_when_publishers_are_gone() {
        let subject: Subject<u32> = Subject::default();
        let mut sub = subject.subscribe();
        subject.publish(3);
        drop(subject);

        assert_eq!(sub.next().await, Some(3));
        assert_eq!(sub.next().await, None);
    }
}
