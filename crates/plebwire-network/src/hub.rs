//! In-process pubsub hub.
//!
//! Every [`LocalTransport`] handed out by a [`LocalHub`] acts as a
//! separate peer: frames it publishes reach every other peer's
//! subscriptions on the topic, never its own.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use plebwire_types::{PlebwireError, Result};

use crate::transport::{Subscription, TopicRegistry, Transport};

/// Shared fan-out point for in-process peers.
pub struct LocalHub {
    registry: Arc<TopicRegistry>,
    next_peer: AtomicU64,
    max_message_size: usize,
}

impl LocalHub {
    pub fn new(max_message_size: usize) -> Arc<Self> {
        Arc::new(Self {
            registry: TopicRegistry::new(),
            next_peer: AtomicU64::new(1),
            max_message_size,
        })
    }

    /// Creates a transport acting as a new peer on this hub.
    pub fn transport(self: &Arc<Self>) -> LocalTransport {
        LocalTransport {
            hub: Arc::clone(self),
            peer: self.next_peer.fetch_add(1, Ordering::Relaxed),
        }
    }

    /// Number of live subscriptions on `topic`, across all peers.
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.registry.subscriber_count(topic)
    }
}

/// One peer's view of a [`LocalHub`].
#[derive(Clone)]
pub struct LocalTransport {
    hub: Arc<LocalHub>,
    peer: u64,
}

impl LocalTransport {
    pub fn peer_id(&self) -> u64 {
        self.peer
    }
}

#[async_trait]
impl Transport for LocalTransport {
    async fn subscribe(&self, topic: &str) -> Result<Subscription> {
        let (subscription, _) = self.hub.registry.register(topic, self.peer);
        Ok(subscription)
    }

    async fn publish(&self, topic: &str, data: Vec<u8>) -> Result<()> {
        if data.len() > self.hub.max_message_size {
            return Err(PlebwireError::NetworkError {
                reason: format!(
                    "frame size {} exceeds maximum {}",
                    data.len(),
                    self.hub.max_message_size
                ),
            });
        }
        let reached = self.hub.registry.deliver(topic, &data, Some(self.peer));
        tracing::trace!(topic, peer = self.peer, reached, "frame published on local hub");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_MAX_MESSAGE_SIZE;

    #[tokio::test]
    async fn peers_see_each_other_not_themselves() -> std::result::Result<(), PlebwireError> {
        let hub = LocalHub::new(DEFAULT_MAX_MESSAGE_SIZE);
        let a = hub.transport();
        let b = hub.transport();
        let mut sub_a = a.subscribe("topic").await?;
        let mut sub_b = b.subscribe("topic").await?;

        a.publish("topic", b"from a".to_vec()).await?;
        assert_eq!(sub_b.recv().await, Some(b"from a".to_vec()));

        b.publish("topic", b"from b".to_vec()).await?;
        assert_eq!(sub_a.recv().await, Some(b"from b".to_vec()));
        Ok(())
    }

    #[tokio::test]
    async fn oversized_frame_rejected() -> std::result::Result<(), PlebwireError> {
        let hub = LocalHub::new(8);
        let a = hub.transport();
        assert!(matches!(
            a.publish("topic", vec![0; 9]).await,
            Err(PlebwireError::NetworkError { .. })
        ));
        Ok(())
    }
}
