//! libp2p gossipsub transport.
//!
//! [`GossipTransport::start`] builds a swarm (TCP + Noise + Yamux with
//! a gossipsub behaviour), starts listening, dials the bootstrap peers
//! and hands the swarm to a background task. The transport handle
//! talks to that task over a bounded command channel; inbound frames
//! are fanned out to local subscriptions through a [`TopicRegistry`].
//!
//! Message ids are the SHA-256 of the frame, so a frame re-sent
//! verbatim is deduplicated by the mesh.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use libp2p::gossipsub;
use libp2p::identity;
use libp2p::swarm::{NetworkBehaviour, SwarmEvent};
use libp2p::{noise, tcp, yamux, Multiaddr, PeerId, Swarm};
use tokio::sync::{mpsc, oneshot};

use plebwire_crypto::hash::sha256;
use plebwire_crypto::signing::Keypair;
use plebwire_types::PlebwireError;

use crate::config::NetworkConfig;
use crate::identity::keypair_to_libp2p;
use crate::transport::{Subscription, TopicRegistry, Transport};

/// Alias that leaves `std::result::Result` unshadowed for the derive macro.
type PResult<T> = std::result::Result<T, PlebwireError>;

/// Commands buffered between the handle and the swarm task.
const COMMAND_BUFFER: usize = 128;

/// Owner tag for subscriptions created by this transport.
const LOCAL_OWNER: u64 = 0;

// ---------------------------------------------------------------------------
// Behaviour
// ---------------------------------------------------------------------------

#[derive(NetworkBehaviour)]
pub struct PlebwireBehaviour {
    pub gossip: gossipsub::Behaviour,
}

/// Builds the gossipsub behaviour with content-hash message ids and
/// signed, strictly validated frames.
///
/// # Errors
///
/// `NetworkError` if libp2p rejects the configuration.
pub fn build_behaviour(keypair: &identity::Keypair, config: &NetworkConfig) -> PResult<PlebwireBehaviour> {
    let gossip_config = gossipsub::ConfigBuilder::default()
        .heartbeat_interval(Duration::from_millis(config.heartbeat_interval_ms))
        .max_transmit_size(config.max_message_size)
        .validation_mode(gossipsub::ValidationMode::Strict)
        .message_id_fn(|message: &gossipsub::Message| gossipsub::MessageId::new(&sha256(&message.data)))
        .build()
        .map_err(|e| PlebwireError::NetworkError {
            reason: format!("failed to build gossipsub config: {e}"),
        })?;

    let gossip = gossipsub::Behaviour::new(gossipsub::MessageAuthenticity::Signed(keypair.clone()), gossip_config)
        .map_err(|e| PlebwireError::NetworkError {
            reason: format!("failed to create gossipsub behaviour: {e}"),
        })?;

    Ok(PlebwireBehaviour { gossip })
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

enum SwarmCommand {
    Subscribe {
        topic: String,
        reply: oneshot::Sender<PResult<()>>,
    },
    Publish {
        topic: String,
        data: Vec<u8>,
        reply: oneshot::Sender<PResult<()>>,
    },
    Dial {
        addr: Multiaddr,
        reply: oneshot::Sender<PResult<()>>,
    },
    Listeners {
        reply: oneshot::Sender<Vec<Multiaddr>>,
    },
    ConnectedPeers {
        reply: oneshot::Sender<Vec<PeerId>>,
    },
}

// ---------------------------------------------------------------------------
// GossipTransport
// ---------------------------------------------------------------------------

/// [`Transport`] backed by a libp2p gossipsub swarm.
///
/// The swarm task stops when the last clone of the handle is dropped.
#[derive(Clone)]
pub struct GossipTransport {
    commands: mpsc::Sender<SwarmCommand>,
    registry: Arc<TopicRegistry>,
    local_peer_id: PeerId,
    max_message_size: usize,
}

impl GossipTransport {
    /// Builds the swarm, starts listening and spawns the swarm task.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// `ConfigError` for an invalid config, `NetworkError` if the
    /// transport cannot be built or the listen address cannot be bound.
    pub async fn start(config: NetworkConfig, keypair: &Keypair) -> PResult<Self> {
        config.validate()?;
        let libp2p_keypair = keypair_to_libp2p(keypair)?;
        let local_peer_id = PeerId::from(libp2p_keypair.public());

        let behaviour_config = config.clone();
        let mut swarm = libp2p::SwarmBuilder::with_existing_identity(libp2p_keypair)
            .with_tokio()
            .with_tcp(tcp::Config::default().nodelay(true), noise::Config::new, yamux::Config::default)
            .map_err(|e| PlebwireError::NetworkError {
                reason: format!("failed to configure TCP transport: {e}"),
            })?
            .with_behaviour(|key| {
                build_behaviour(key, &behaviour_config).map_err(|e| Box::new(e) as Box<dyn std::error::Error + Send + Sync>)
            })
            .map_err(|e| PlebwireError::NetworkError {
                reason: format!("failed to build network behaviour: {e}"),
            })?
            .with_swarm_config(|cfg| cfg.with_idle_connection_timeout(Duration::from_secs(config.idle_timeout_secs)))
            .build();

        swarm.listen_on(config.listen_addr.clone()).map_err(|e| PlebwireError::NetworkError {
            reason: format!("failed to listen on {}: {e}", config.listen_addr),
        })?;

        for addr in &config.bootstrap_nodes {
            if let Err(e) = swarm.dial(addr.clone()) {
                tracing::warn!(%addr, %e, "failed to dial bootstrap peer");
            }
        }

        let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
        let (released_tx, released_rx) = mpsc::unbounded_channel();
        let registry = TopicRegistry::with_release_notifier(released_tx);

        tokio::spawn(run_swarm(swarm, command_rx, released_rx, Arc::clone(&registry)));
        tracing::info!(%local_peer_id, "gossip transport started");

        Ok(Self {
            commands: command_tx,
            registry,
            local_peer_id,
            max_message_size: config.max_message_size,
        })
    }

    pub fn local_peer_id(&self) -> &PeerId {
        &self.local_peer_id
    }

    /// Addresses the swarm is currently listening on.
    pub async fn listeners(&self) -> PResult<Vec<Multiaddr>> {
        let (reply, rx) = oneshot::channel();
        self.send(SwarmCommand::Listeners { reply }).await?;
        rx.await.map_err(|_| task_gone())
    }

    pub async fn connected_peers(&self) -> PResult<Vec<PeerId>> {
        let (reply, rx) = oneshot::channel();
        self.send(SwarmCommand::ConnectedPeers { reply }).await?;
        rx.await.map_err(|_| task_gone())
    }

    /// Dials a peer.
    pub async fn dial(&self, addr: Multiaddr) -> PResult<()> {
        let (reply, rx) = oneshot::channel();
        self.send(SwarmCommand::Dial { addr, reply }).await?;
        rx.await.map_err(|_| task_gone())?
    }

    async fn send(&self, command: SwarmCommand) -> PResult<()> {
        self.commands.send(command).await.map_err(|_| task_gone())
    }
}

fn task_gone() -> PlebwireError {
    PlebwireError::NetworkError {
        reason: "swarm task has stopped".into(),
    }
}

#[async_trait]
impl Transport for GossipTransport {
    async fn subscribe(&self, topic: &str) -> PResult<Subscription> {
        let (subscription, first) = self.registry.register(topic, LOCAL_OWNER);
        if first {
            let (reply, rx) = oneshot::channel();
            self.send(SwarmCommand::Subscribe {
                topic: topic.to_string(),
                reply,
            })
            .await?;
            rx.await.map_err(|_| task_gone())??;
        }
        Ok(subscription)
    }

    async fn publish(&self, topic: &str, data: Vec<u8>) -> PResult<()> {
        if data.len() > self.max_message_size {
            return Err(PlebwireError::NetworkError {
                reason: format!("frame size {} exceeds maximum {}", data.len(), self.max_message_size),
            });
        }
        let (reply, rx) = oneshot::channel();
        self.send(SwarmCommand::Publish {
            topic: topic.to_string(),
            data,
            reply,
        })
        .await?;
        rx.await.map_err(|_| task_gone())?
    }
}

// ---------------------------------------------------------------------------
// Swarm task
// ---------------------------------------------------------------------------

async fn run_swarm(
    mut swarm: Swarm<PlebwireBehaviour>,
    mut commands: mpsc::Receiver<SwarmCommand>,
    mut released: mpsc::UnboundedReceiver<String>,
    registry: Arc<TopicRegistry>,
) {
    loop {
        tokio::select! {
            event = swarm.select_next_some() => handle_swarm_event(event, &registry),

            command = commands.recv() => match command {
                Some(command) => handle_command(&mut swarm, command),
                None => break,
            },

            Some(topic) = released.recv() => {
                // A new subscriber may have arrived since the release was queued.
                if registry.subscriber_count(&topic) == 0 {
                    let _ = swarm.behaviour_mut().gossip.unsubscribe(&gossipsub::IdentTopic::new(&topic));
                    tracing::debug!(%topic, "left topic");
                }
            }
        }
    }
    tracing::info!("gossip swarm task stopped");
}

fn handle_command(swarm: &mut Swarm<PlebwireBehaviour>, command: SwarmCommand) {
    match command {
        SwarmCommand::Subscribe { topic, reply } => {
            let result = swarm
                .behaviour_mut()
                .gossip
                .subscribe(&gossipsub::IdentTopic::new(&topic))
                .map(|_| ())
                .map_err(|e| PlebwireError::NetworkError {
                    reason: format!("failed to subscribe to topic '{topic}': {e}"),
                });
            let _ = reply.send(result);
        }
        SwarmCommand::Publish { topic, data, reply } => {
            let result = match swarm.behaviour_mut().gossip.publish(gossipsub::IdentTopic::new(&topic), data) {
                Ok(_) => Ok(()),
                // Nobody is listening yet or the frame was already sent; the
                // exchange timeouts cover both.
                Err(gossipsub::PublishError::InsufficientPeers) => {
                    tracing::debug!(%topic, "no peers for topic, frame not propagated");
                    Ok(())
                }
                Err(gossipsub::PublishError::Duplicate) => Ok(()),
                Err(e) => Err(PlebwireError::NetworkError {
                    reason: format!("failed to publish to topic '{topic}': {e}"),
                }),
            };
            let _ = reply.send(result);
        }
        SwarmCommand::Dial { addr, reply } => {
            let result = swarm.dial(addr.clone()).map_err(|e| PlebwireError::NetworkError {
                reason: format!("failed to dial {addr}: {e}"),
            });
            let _ = reply.send(result);
        }
        SwarmCommand::Listeners { reply } => {
            let _ = reply.send(swarm.listeners().cloned().collect());
        }
        SwarmCommand::ConnectedPeers { reply } => {
            let _ = reply.send(swarm.connected_peers().cloned().collect());
        }
    }
}

fn handle_swarm_event(event: SwarmEvent<PlebwireBehaviourEvent>, registry: &TopicRegistry) {
    match event {
        SwarmEvent::Behaviour(PlebwireBehaviourEvent::Gossip(gossipsub::Event::Message {
            propagation_source,
            message,
            ..
        })) => {
            let topic = message.topic.as_str();
            let reached = registry.deliver(topic, &message.data, None);
            tracing::trace!(%propagation_source, topic, reached, "gossip frame received");
        }
        SwarmEvent::Behaviour(PlebwireBehaviourEvent::Gossip(gossipsub::Event::Subscribed { peer_id, topic })) => {
            tracing::debug!(%peer_id, %topic, "peer subscribed to topic");
        }
        SwarmEvent::NewListenAddr { address, .. } => {
            tracing::info!(%address, "listening");
        }
        SwarmEvent::ConnectionEstablished { peer_id, endpoint, .. } => {
            tracing::info!(%peer_id, ?endpoint, "connection established");
        }
        SwarmEvent::ConnectionClosed { peer_id, cause, num_established, .. } => {
            tracing::info!(%peer_id, ?cause, num_established, "connection closed");
        }
        SwarmEvent::OutgoingConnectionError { peer_id, error, .. } => {
            tracing::warn!(?peer_id, %error, "outgoing connection error");
        }
        other => {
            tracing::trace!(?other, "unhandled swarm event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loopback_config() -> NetworkConfig {
        NetworkConfig {
            listen_addr: "/ip4/127.0.0.1/tcp/0".parse().unwrap_or_else(|_| Multiaddr::empty()),
            ..NetworkConfig::default()
        }
    }

    #[test]
    fn behaviour_builds() {
        let keypair = identity::Keypair::generate_ed25519();
        assert!(build_behaviour(&keypair, &NetworkConfig::default()).is_ok());
    }

    #[tokio::test]
    async fn publish_without_peers_is_not_an_error() -> PResult<()> {
        let transport = GossipTransport::start(loopback_config(), &Keypair::from_seed(&[7; 32])).await?;
        let _sub = transport.subscribe("topic").await?;
        transport.publish("topic", b"frame".to_vec()).await?;
        assert!(transport.publish("topic", vec![0; transport.max_message_size + 1]).await.is_err());
        Ok(())
    }
}
