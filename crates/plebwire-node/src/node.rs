//! Subplebbit node lifecycle and event loop.
//!
//! # State machine
//!
//! ```text
//! Initializing ──start()──▶ Running ──shutdown()──▶ ShuttingDown ──▶ (dropped)
//! ```
//!
//! `start()` restores the aggregator, subscribes to the subplebbit
//! topic, publishes a first index and spawns the event loop. The loop
//! multiplexes with `tokio::select!`:
//!
//! 1. **Topic frames**: challenge requests and answers.
//! 2. **Commands**: status, roles, republish, shutdown.
//! 3. **Expiry tick**: drops unanswered exchanges.
//! 4. **Bucket tick**: moves aged update files and republishes.
//! 5. **Shutdown signal** via `watch`.
//!
//! Double-start and shutdown-before-start are rejected with
//! `ConfigError`.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use plebwire_crypto::signing::{Keypair, PublicKey};
use plebwire_network::{Subscription, Transport};
use plebwire_protocol::record::RoleKind;
use plebwire_storage::ContentStore;
use plebwire_types::config::ProtocolConfig;
use plebwire_types::{Address, PlebwireError, Result};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::aggregator::{Aggregator, SubplebbitProfile};
use crate::challenge::ChallengePolicy;
use crate::command::{NodeCommand, NodeStatus};
use crate::content::ContentPublisher;
use crate::responder::Responder;

/// Bounded command channel capacity.
const COMMAND_CHANNEL_SIZE: usize = 64;

/// How often aged update files are moved to their next bucket.
const BUCKET_REFRESH_SECS: u64 = 3_600;

// ---------------------------------------------------------------------------
// NodeState
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum NodeState {
    Initializing,
    Running,
    ShuttingDown,
}

impl std::fmt::Display for NodeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Initializing => write!(f, "initializing"),
            Self::Running => write!(f, "running"),
            Self::ShuttingDown => write!(f, "shutting_down"),
        }
    }
}

/// Owner-supplied description of the subplebbit.
#[derive(Clone, Debug, Default)]
pub struct SubplebbitSettings {
    pub title: Option<String>,
    pub description: Option<String>,
    /// Initial role table, merged over any restored one.
    pub roles: BTreeMap<Address, RoleKind>,
}

fn copy_keypair(keypair: &Keypair) -> Keypair {
    Keypair::from_seed(&keypair.seed_bytes())
}

// ---------------------------------------------------------------------------
// Runtime pieces
// ---------------------------------------------------------------------------

/// Components held until `start()`.
struct Pending {
    keypair: Keypair,
    store: Arc<dyn ContentStore>,
    transport: Arc<dyn Transport>,
    policy: Arc<dyn ChallengePolicy>,
    settings: SubplebbitSettings,
    config: ProtocolConfig,
    command_rx: mpsc::Receiver<NodeCommand>,
    shutdown_rx: watch::Receiver<bool>,
}

/// State moved into the event loop task.
struct LoopRuntime {
    address: Address,
    responder: Responder,
    aggregator: Arc<Aggregator>,
    subscription: Subscription,
    command_rx: mpsc::Receiver<NodeCommand>,
    shutdown_rx: watch::Receiver<bool>,
    expiry_secs: u64,
}

// ---------------------------------------------------------------------------
// SubplebbitNode
// ---------------------------------------------------------------------------

/// A running subplebbit: answers challenge requests on its topic and
/// keeps its index record current.
pub struct SubplebbitNode {
    state: NodeState,
    address: Address,
    public_key: PublicKey,
    pending: Option<Pending>,
    aggregator: Option<Arc<Aggregator>>,
    command_tx: mpsc::Sender<NodeCommand>,
    shutdown_tx: watch::Sender<bool>,
}

impl SubplebbitNode {
    /// # Errors
    ///
    /// `ConfigError` if `config` does not validate.
    pub fn new(
        keypair: Keypair,
        store: Arc<dyn ContentStore>,
        transport: Arc<dyn Transport>,
        policy: Arc<dyn ChallengePolicy>,
        settings: SubplebbitSettings,
        config: ProtocolConfig,
    ) -> Result<Self> {
        config.validate()?;
        let (command_tx, command_rx) = mpsc::channel(COMMAND_CHANNEL_SIZE);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Ok(Self {
            state: NodeState::Initializing,
            address: keypair.address(),
            public_key: keypair.public_key(),
            pending: Some(Pending {
                keypair,
                store,
                transport,
                policy,
                settings,
                config,
                command_rx,
                shutdown_rx,
            }),
            aggregator: None,
            command_tx,
            shutdown_tx,
        })
    }

    /// Publishes the first index and spawns the event loop.
    ///
    /// # Errors
    ///
    /// - `ConfigError` unless the node is `Initializing`.
    /// - Store or transport failures while restoring, subscribing or
    ///   publishing the first index.
    pub async fn start(&mut self) -> Result<JoinHandle<()>> {
        if self.state != NodeState::Initializing {
            return Err(PlebwireError::ConfigError {
                reason: format!("cannot start node in state '{}'; expected 'initializing'", self.state),
            });
        }
        let p = self.pending.take().ok_or_else(|| PlebwireError::ConfigError {
            reason: "node components already consumed".into(),
        })?;

        let profile = SubplebbitProfile {
            title: p.settings.title,
            description: p.settings.description,
            challenges: p.policy.describe(),
        };
        let aggregator = Arc::new(
            Aggregator::open(
                Arc::clone(&p.store),
                copy_keypair(&p.keypair),
                p.config.clone(),
                profile,
                p.settings.roles,
            )
            .await?,
        );
        let content = ContentPublisher::new(
            Arc::clone(&p.store),
            Arc::clone(&aggregator),
            copy_keypair(&p.keypair),
            p.config.clone(),
        );

        let subscription = p.transport.subscribe(&self.address.topic()).await?;
        aggregator.republish().await?;

        let runtime = LoopRuntime {
            address: self.address,
            expiry_secs: p.config.challenge_timeout_secs,
            responder: Responder::new(
                p.keypair,
                p.transport,
                p.policy,
                content,
                Arc::clone(&aggregator),
                p.config,
            ),
            aggregator: Arc::clone(&aggregator),
            subscription,
            command_rx: p.command_rx,
            shutdown_rx: p.shutdown_rx,
        };
        let handle = tokio::spawn(run_event_loop(runtime));

        self.aggregator = Some(aggregator);
        self.state = NodeState::Running;
        tracing::info!(address = %self.address, "subplebbit node started");
        Ok(handle)
    }

    /// Signals the event loop to exit. Idempotent once running.
    ///
    /// # Errors
    ///
    /// `ConfigError` if the node was never started.
    pub fn shutdown(&mut self) -> Result<()> {
        match self.state {
            NodeState::Initializing => Err(PlebwireError::ConfigError {
                reason: "cannot shutdown a node that has not been started".into(),
            }),
            NodeState::ShuttingDown => Ok(()),
            NodeState::Running => {
                self.state = NodeState::ShuttingDown;
                let _ = self.shutdown_tx.send(true);
                Ok(())
            }
        }
    }

    pub fn command_sender(&self) -> mpsc::Sender<NodeCommand> {
        self.command_tx.clone()
    }

    pub fn state(&self) -> NodeState {
        self.state
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// Key publishers encrypt their requests to.
    pub fn public_key(&self) -> PublicKey {
        self.public_key
    }

    /// The aggregator, once started.
    pub fn aggregator(&self) -> Option<Arc<Aggregator>> {
        self.aggregator.clone()
    }
}

// ---------------------------------------------------------------------------
// Event loop
// ---------------------------------------------------------------------------

async fn run_event_loop(mut rt: LoopRuntime) {
    tracing::info!(address = %rt.address, "node event loop started");

    let mut expiry_tick = tokio::time::interval(Duration::from_secs(rt.expiry_secs.max(1)));
    let bucket_period = Duration::from_secs(BUCKET_REFRESH_SECS);
    let mut bucket_tick = tokio::time::interval_at(tokio::time::Instant::now() + bucket_period, bucket_period);

    loop {
        tokio::select! {
            frame = rt.subscription.recv() => {
                match frame {
                    Some(frame) => rt.responder.handle_frame(&frame).await,
                    None => {
                        tracing::warn!("topic subscription closed -- exiting event loop");
                        break;
                    }
                }
            }

            Some(cmd) = rt.command_rx.recv() => {
                if handle_command(cmd, &rt).await {
                    tracing::info!("shutdown command received -- exiting event loop");
                    break;
                }
            }

            _ = expiry_tick.tick() => {
                rt.responder.expire();
            }

            _ = bucket_tick.tick() => {
                if let Err(e) = rt.aggregator.republish().await {
                    tracing::warn!(%e, "periodic republish failed");
                }
            }

            changed = rt.shutdown_rx.changed() => {
                if changed.is_err() || *rt.shutdown_rx.borrow() {
                    tracing::info!("shutdown signal received -- exiting event loop");
                    break;
                }
            }
        }
    }

    tracing::info!(address = %rt.address, "node event loop exited");
}

/// Returns `true` when the loop should stop.
async fn handle_command(cmd: NodeCommand, rt: &LoopRuntime) -> bool {
    tracing::debug!(?cmd, "node command");
    match cmd {
        NodeCommand::GetStatus { reply } => {
            let status = NodeStatus {
                state: NodeState::Running,
                address: rt.address,
                comment_count: rt.aggregator.comment_count().await,
                open_exchanges: rt.responder.open_exchanges(),
            };
            let _ = reply.send(status);
        }
        NodeCommand::SetRole { address, role, reply } => {
            let _ = reply.send(rt.aggregator.set_role(address, role).await);
        }
        NodeCommand::Republish { reply } => {
            let _ = reply.send(rt.aggregator.republish().await);
        }
        NodeCommand::Shutdown => return true,
    }
    false
}
