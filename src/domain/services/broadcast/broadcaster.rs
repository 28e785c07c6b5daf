//--------------------------------------------------------------------------------------------------
// MODULE OVERVIEW
//--------------------------------------------------------------------------------------------------
// Fan-out of level updates for a single instrument. The broadcaster keeps one bounded
// queue per subscriber and never blocks the publishing (engine) side: when a subscriber's
// queue is full the update is dropped for that subscriber only and its drop counter is
// incremented, so a slow consumer cannot stall the book or its peers.
//
// | Component        | Description                                                            |
// |------------------|------------------------------------------------------------------------|
// | Broadcaster      | Subscriber registry plus non-blocking publish                          |
// | SubscriberHandle | Pull side: FIFO queue receiver and the drop counter                    |
//--------------------------------------------------------------------------------------------------

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::domain::models::types::LevelUpdate;

/// Default bound of each subscriber's update queue.
pub const DEFAULT_SUBSCRIBER_CAPACITY: usize = 1024;

/// Publishing half of one subscriber registration.
struct SubscriberSlot {
    id: Uuid,
    sender: mpsc::Sender<LevelUpdate>,
    dropped: Arc<AtomicU64>,
}

/// Per-instrument update fan-out with bounded per-subscriber buffering.
///
/// The broadcaster itself carries no lock: registration, detach and publish
/// are all `&mut self` and are serialized by the owning market's mutex, the
/// same region that serializes book mutations. That shared region is what
/// makes a subscriber's snapshot/first-update boundary atomic.
#[derive(Debug)]
pub struct Broadcaster {
    /// Symbol of the instrument this broadcaster serves.
    instrument: String,
    /// Registered subscribers. Slots with a gone receiver are pruned on publish.
    subscribers: Vec<SubscriberSlot>,
    /// Queue bound applied to new subscribers.
    capacity: usize,
}

impl Broadcaster {
    /// Creates a broadcaster whose subscribers get queues of `capacity` updates.
    pub fn new(instrument: impl Into<String>, capacity: usize) -> Self {
        Self {
            instrument: instrument.into(),
            subscribers: Vec::new(),
            capacity: capacity.max(1),
        }
    }

    /// Registers a new subscriber and returns its pull handle.
    ///
    /// The caller is responsible for pairing this with a book snapshot inside
    /// the market's critical section; the handle only ever sees updates
    /// published after registration.
    pub fn register(&mut self) -> SubscriberHandle {
        let (sender, receiver) = mpsc::channel(self.capacity);
        let dropped = Arc::new(AtomicU64::new(0));
        let id = Uuid::new_v4();
        self.subscribers.push(SubscriberSlot { id, sender, dropped: dropped.clone() });
        debug!(
            instrument = %self.instrument,
            subscriber = %id,
            total = self.subscribers.len(),
            "subscriber attached"
        );
        SubscriberHandle { id, instrument: self.instrument.clone(), receiver, dropped }
    }

    /// Removes a subscriber. Buffered undelivered updates are discarded with it.
    pub fn detach(&mut self, id: Uuid) {
        let before = self.subscribers.len();
        self.subscribers.retain(|slot| slot.id != id);
        if self.subscribers.len() < before {
            debug!(
                instrument = %self.instrument,
                subscriber = %id,
                remaining = self.subscribers.len(),
                "subscriber detached"
            );
        }
    }

    /// Delivers one update to every subscriber without blocking.
    ///
    /// A full queue drops the update for that subscriber only (drop-newest)
    /// and bumps its drop counter; the session observes the counter and can
    /// resynchronize. Subscribers whose receiver is gone are pruned here.
    pub fn publish(&mut self, update: &LevelUpdate) {
        self.subscribers.retain(|slot| {
            match slot.sender.try_send(update.clone()) {
                Ok(()) => true,
                Err(TrySendError::Full(_)) => {
                    slot.dropped.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        instrument = %update.instrument,
                        subscriber = %slot.id,
                        sequence = update.sequence,
                        "subscriber queue full, dropping update"
                    );
                    true
                }
                Err(TrySendError::Closed(_)) => false,
            }
        });
    }

    /// Closes every subscriber queue. Pending buffered updates drain normally,
    /// after which each handle's `next` yields `None`.
    pub fn close_all(&mut self) {
        self.subscribers.clear();
    }

    /// Number of currently registered subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Queue bound applied to new subscribers.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl std::fmt::Debug for SubscriberSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriberSlot")
            .field("id", &self.id)
            .field("dropped", &self.dropped.load(Ordering::Relaxed))
            .finish()
    }
}

/// Pull side of one subscription: updates arrive in publish order.
#[derive(Debug)]
pub struct SubscriberHandle {
    id: Uuid,
    instrument: String,
    receiver: mpsc::Receiver<LevelUpdate>,
    dropped: Arc<AtomicU64>,
}

impl SubscriberHandle {
    /// Waits for the next update. `None` means the broadcaster closed this
    /// subscription (detach, shutdown or book quarantine).
    pub async fn next(&mut self) -> Option<LevelUpdate> {
        self.receiver.recv().await
    }

    /// Non-blocking variant of [`next`](Self::next).
    pub fn try_next(&mut self) -> Option<LevelUpdate> {
        self.receiver.try_recv().ok()
    }

    /// Number of updates dropped for this subscriber because its queue was full.
    pub fn dropped_updates(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// True once any update has been dropped; the stream has a gap and the
    /// session should resynchronize from a fresh snapshot.
    pub fn has_gap(&self) -> bool {
        self.dropped_updates() > 0
    }

    /// Identifier used to detach this subscription.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Symbol of the subscribed instrument.
    pub fn instrument(&self) -> &str {
        &self.instrument
    }
}

//--------------------------------------------------------------------------------------------------
//  TESTS
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::types::{Price, Side};
    use chrono::Utc;

    fn update(sequence: u64) -> LevelUpdate {
        LevelUpdate {
            instrument: "BTC_USD".to_string(),
            price: Price::from_ticks(10_000),
            quantity: 5,
            side: Side::Bid,
            sequence,
            timestamp: Utc::now(),
        }
    }

    /// Updates arrive in publish order.
    #[tokio::test]
    async fn test_updates_delivered_in_order() {
        let mut broadcaster = Broadcaster::new("BTC_USD", 16);
        let mut handle = broadcaster.register();

        for sequence in 1..=5 {
            broadcaster.publish(&update(sequence));
        }
        for sequence in 1..=5 {
            assert_eq!(handle.next().await.unwrap().sequence, sequence);
        }
        assert!(!handle.has_gap());
    }

    /// A full queue drops newest updates for that subscriber only.
    #[tokio::test]
    async fn test_slow_subscriber_drops_do_not_affect_peers() {
        let mut broadcaster = Broadcaster::new("BTC_USD", 2);
        let mut slow = broadcaster.register();
        let mut fast = broadcaster.register();

        for sequence in 1..=5 {
            broadcaster.publish(&update(sequence));
        }

        // The slow subscriber kept the oldest two and dropped the rest.
        assert!(slow.has_gap());
        assert!(slow.dropped_updates() >= 3);
        assert_eq!(slow.next().await.unwrap().sequence, 1);
        assert_eq!(slow.next().await.unwrap().sequence, 2);

        // Its peer saw everything, in order.
        for sequence in 1..=5 {
            assert_eq!(fast.next().await.unwrap().sequence, sequence);
        }
        assert!(!fast.has_gap());
    }

    /// Detaching removes the subscriber and closes its queue.
    #[tokio::test]
    async fn test_detach_closes_queue() {
        let mut broadcaster = Broadcaster::new("BTC_USD", 4);
        let mut handle = broadcaster.register();
        assert_eq!(broadcaster.subscriber_count(), 1);

        broadcaster.detach(handle.id());
        assert_eq!(broadcaster.subscriber_count(), 0);
        assert_eq!(handle.next().await, None);
    }

    /// Dropped receivers are pruned on the next publish.
    #[tokio::test]
    async fn test_gone_receiver_pruned_on_publish() {
        let mut broadcaster = Broadcaster::new("BTC_USD", 4);
        let handle = broadcaster.register();
        drop(handle);

        broadcaster.publish(&update(1));
        assert_eq!(broadcaster.subscriber_count(), 0);
    }

    /// close_all lets buffered updates drain, then ends every stream.
    #[tokio::test]
    async fn test_close_all_drains_then_ends() {
        let mut broadcaster = Broadcaster::new("BTC_USD", 4);
        let mut handle = broadcaster.register();
        broadcaster.publish(&update(1));
        broadcaster.close_all();

        assert_eq!(handle.next().await.unwrap().sequence, 1);
        assert_eq!(handle.next().await, None);
    }

    /// The capacity floor is one slot.
    #[test]
    fn test_capacity_floor() {
        let broadcaster = Broadcaster::new("BTC_USD", 0);
        assert_eq!(broadcaster.capacity(), 1);
    }
}
