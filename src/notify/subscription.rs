//! Channel-backed change subscriptions.

use crossbeam_channel::{Receiver, RecvError, RecvTimeoutError, TryRecvError};
use std::time::Duration;

/// Receiving end of a change subscription.
///
/// Each signal carries no payload; observers re-read the collection.
pub struct ChangeSubscription {
    receiver: Receiver<()>,
}

impl ChangeSubscription {
    pub(crate) fn new(receiver: Receiver<()>) -> Self {
        Self { receiver }
    }

    /// Wait for the next change (blocking).
    pub fn recv(&self) -> Result<(), RecvError> {
        self.receiver.recv()
    }

    /// Check for a change without blocking.
    pub fn try_recv(&self) -> Result<(), TryRecvError> {
        self.receiver.try_recv()
    }

    /// Wait for a change with a timeout.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<(), RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }

    /// Consume all buffered signals, returning how many there were.
    pub fn drain(&self) -> usize {
        self.receiver.try_iter().count()
    }
}

#[cfg(test)]
mod tests {
    use crate::notify::ChangeHub;
    use std::time::Duration;

    #[test]
    fn test_drain_counts_pending() {
        let hub = ChangeHub::new();
        let sub = hub.subscribe(8);

        hub.fire();
        hub.fire();
        hub.fire();

        assert_eq!(sub.drain(), 3);
        assert_eq!(sub.drain(), 0);
    }

    #[test]
    fn test_recv_timeout_without_change() {
        let hub = ChangeHub::new();
        let sub = hub.subscribe(1);
        assert!(sub.recv_timeout(Duration::from_millis(5)).is_err());
    }
}
