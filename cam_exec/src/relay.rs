//! # Frame relay
//!
//! Hands frames from the single producer to any number of stream clients. Only the newest frame
//! is kept: a client that falls behind skips straight to the latest frame rather than working
//! through a backlog.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use bytes::Bytes;
use tokio::sync::watch;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Publishing side of the relay. Clones publish into the same slot.
#[derive(Clone)]
pub struct FrameRelay {
    tx: watch::Sender<Option<Bytes>>,
}

/// One client's view of the relay.
pub struct FrameSubscriber {
    rx: watch::Receiver<Option<Bytes>>,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl FrameRelay {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self { tx }
    }

    /// Replace the current frame and wake every waiting subscriber.
    pub fn publish(&self, frame: Bytes) {
        self.tx.send_replace(Some(frame));
    }

    /// Subscribe to frames published from now on.
    pub fn subscribe(&self) -> FrameSubscriber {
        FrameSubscriber {
            rx: self.tx.subscribe(),
        }
    }

    /// The most recently published frame, if any.
    pub fn latest(&self) -> Option<Bytes> {
        self.tx.borrow().clone()
    }

    pub fn num_subscribers(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for FrameRelay {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameSubscriber {
    /// A new subscriber to the same relay, waiting for frames published from now on.
    pub fn fresh(&self) -> Self {
        let mut rx = self.rx.clone();
        rx.borrow_and_update();
        Self { rx }
    }

    /// Wait for a frame newer than the last one seen.
    ///
    /// Returns `None` once every publisher has gone.
    pub async fn next_frame(&mut self) -> Option<Bytes> {
        loop {
            self.rx.changed().await.ok()?;

            if let Some(f) = self.rx.borrow_and_update().clone() {
                return Some(f);
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    #[tokio::test]
    async fn test_new_frames_only() {
        let relay = FrameRelay::new();
        relay.publish(Bytes::from_static(b"old"));

        let mut sub = relay.subscribe();
        assert!(timeout(Duration::from_millis(20), sub.next_frame())
            .await
            .is_err());

        relay.publish(Bytes::from_static(b"new"));
        assert_eq!(sub.next_frame().await, Some(Bytes::from_static(b"new")));
        assert_eq!(relay.latest(), Some(Bytes::from_static(b"new")));
    }

    #[tokio::test]
    async fn test_slow_subscriber_gets_latest() {
        let relay = FrameRelay::new();
        let mut fast = relay.subscribe();
        let mut slow = relay.subscribe();
        assert_eq!(relay.num_subscribers(), 2);

        for i in 0..5u8 {
            relay.publish(Bytes::from(vec![i]));
            assert_eq!(fast.next_frame().await, Some(Bytes::from(vec![i])));
        }

        // No backlog, only the newest frame
        assert_eq!(slow.next_frame().await, Some(Bytes::from(vec![4])));
        assert!(timeout(Duration::from_millis(20), slow.next_frame())
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_fresh_subscriber() {
        let relay = FrameRelay::new();
        let template = relay.subscribe();

        relay.publish(Bytes::from_static(b"a"));
        let mut sub = template.fresh();
        assert!(timeout(Duration::from_millis(20), sub.next_frame())
            .await
            .is_err());

        relay.publish(Bytes::from_static(b"b"));
        assert_eq!(sub.next_frame().await, Some(Bytes::from_static(b"b")));
    }

    #[tokio::test]
    async fn test_ends_with_publisher() {
        let relay = FrameRelay::new();
        let mut sub = relay.subscribe();
        drop(relay);

        assert_eq!(sub.next_frame().await, None);
    }
}
