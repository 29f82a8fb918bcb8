//! The [`Transport`] contract and the subscriber bookkeeping shared by
//! its implementations.
//!
//! A [`Subscription`] owns the receiving half of a bounded channel.
//! Dropping it (or calling [`Subscription::unsubscribe`]) removes it
//! from the [`TopicRegistry`]; when the last subscriber of a topic
//! goes away the registry reports the topic on its release channel so
//! the transport can leave the topic at the network level.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;

use plebwire_types::Result;

/// Frames buffered per subscription before new frames are dropped.
pub const SUBSCRIPTION_BUFFER: usize = 256;

// ---------------------------------------------------------------------------
// Transport
// ---------------------------------------------------------------------------

/// Topic-based publish/subscribe.
///
/// A transport never delivers a frame back to subscriptions it created
/// itself; peers see each other's frames, not their own.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Subscribes to `topic`. Frames arrive on the returned handle until
    /// it is dropped.
    async fn subscribe(&self, topic: &str) -> Result<Subscription>;

    /// Publishes `data` on `topic`.
    async fn publish(&self, topic: &str, data: Vec<u8>) -> Result<()>;
}

// ---------------------------------------------------------------------------
// TopicRegistry
// ---------------------------------------------------------------------------

struct Subscriber {
    id: u64,
    owner: u64,
    sender: mpsc::Sender<Vec<u8>>,
}

/// Local subscribers per topic.
pub struct TopicRegistry {
    topics: Mutex<HashMap<String, Vec<Subscriber>>>,
    next_id: AtomicU64,
    released: Option<mpsc::UnboundedSender<String>>,
}

impl TopicRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            topics: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            released: None,
        })
    }

    /// Creates a registry that sends a topic name on `released` each
    /// time the topic loses its last subscriber.
    pub fn with_release_notifier(released: mpsc::UnboundedSender<String>) -> Arc<Self> {
        Arc::new(Self {
            topics: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            released: Some(released),
        })
    }

    /// Registers a subscriber owned by `owner` and returns its handle.
    ///
    /// The boolean is `true` when this is the topic's first subscriber.
    pub fn register(self: &Arc<Self>, topic: &str, owner: u64) -> (Subscription, bool) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = mpsc::channel(SUBSCRIPTION_BUFFER);
        let mut first = false;
        if let Ok(mut topics) = self.topics.lock() {
            let subs = topics.entry(topic.to_string()).or_default();
            first = subs.is_empty();
            subs.push(Subscriber { id, owner, sender });
        }
        let subscription = Subscription {
            topic: topic.to_string(),
            id,
            receiver,
            registry: Arc::clone(self),
        };
        (subscription, first)
    }

    fn remove(&self, topic: &str, id: u64) {
        let emptied = match self.topics.lock() {
            Ok(mut topics) => {
                let emptied = match topics.get_mut(topic) {
                    Some(subs) => {
                        subs.retain(|s| s.id != id);
                        subs.is_empty()
                    }
                    None => false,
                };
                if emptied {
                    topics.remove(topic);
                }
                emptied
            }
            Err(_) => false,
        };
        if emptied {
            if let Some(released) = &self.released {
                let _ = released.send(topic.to_string());
            }
        }
    }

    /// Delivers `data` to every subscriber of `topic` except those owned
    /// by `exclude_owner`. Returns the number of subscribers reached.
    ///
    /// A subscriber whose buffer is full misses the frame.
    pub fn deliver(&self, topic: &str, data: &[u8], exclude_owner: Option<u64>) -> usize {
        let Ok(topics) = self.topics.lock() else {
            return 0;
        };
        let Some(subs) = topics.get(topic) else {
            return 0;
        };
        let mut reached = 0;
        for sub in subs.iter().filter(|s| Some(s.owner) != exclude_owner) {
            match sub.sender.try_send(data.to_vec()) {
                Ok(()) => reached += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    tracing::warn!(topic, subscriber = sub.id, "subscription buffer full, frame dropped");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {}
            }
        }
        reached
    }

    /// Number of live subscribers on `topic`.
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.topics
            .lock()
            .map(|t| t.get(topic).map_or(0, Vec::len))
            .unwrap_or(0)
    }
}

// ---------------------------------------------------------------------------
// Subscription
// ---------------------------------------------------------------------------

/// Receiving end of a topic subscription.
pub struct Subscription {
    topic: String,
    id: u64,
    receiver: mpsc::Receiver<Vec<u8>>,
    registry: Arc<TopicRegistry>,
}

impl Subscription {
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Waits for the next frame. `None` once the transport is gone.
    pub async fn recv(&mut self) -> Option<Vec<u8>> {
        self.receiver.recv().await
    }

    /// Releases the subscription. Equivalent to dropping it.
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.registry.remove(&self.topic, self.id);
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("topic", &self.topic)
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}
