//! Pubsub transports for plebwire.
//!
//! The challenge exchange only needs topic-based publish/subscribe.
//! [`Transport`] captures that contract; two implementations ship:
//!
//! - [`hub::LocalHub`]: in-process fan-out, used by tests and by
//!   embedders running publisher and subplebbit in one process.
//! - [`gossip::GossipTransport`]: libp2p gossipsub over TCP + Noise +
//!   Yamux, driven by a background swarm task.

pub mod config;
pub mod gossip;
pub mod hub;
pub mod identity;
pub mod transport;

pub use config::NetworkConfig;
pub use gossip::GossipTransport;
pub use hub::{LocalHub, LocalTransport};
pub use transport::{Subscription, TopicRegistry, Transport};
