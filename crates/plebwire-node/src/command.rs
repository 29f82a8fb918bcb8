//! Commands and status types for external → node communication.
//!
//! [`NodeCommand`] travels over the bounded command channel returned by
//! [`SubplebbitNode::command_sender`](crate::node::SubplebbitNode::command_sender).
//! Commands that produce a result carry a `oneshot` reply sender. The
//! event loop handles them one at a time, between incoming frames.

use plebwire_protocol::record::{RoleKind, SubplebbitIndexRecord};
use plebwire_types::{Address, Result};
use tokio::sync::oneshot;

use crate::node::NodeState;

pub enum NodeCommand {
    /// Snapshot of the node.
    GetStatus {
        reply: oneshot::Sender<NodeStatus>,
    },

    /// Grants (`Some`) or revokes (`None`) a moderation role and
    /// republishes the index.
    SetRole {
        address: Address,
        role: Option<RoleKind>,
        reply: oneshot::Sender<Result<()>>,
    },

    /// Republishes the index immediately, moving aged update files.
    Republish {
        reply: oneshot::Sender<Result<SubplebbitIndexRecord>>,
    },

    /// Stops the event loop. Fire-and-forget; await the handle returned
    /// by `start` to observe completion.
    Shutdown,
}

// oneshot::Sender is not Debug.
impl std::fmt::Debug for NodeCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::GetStatus { .. } => f.write_str("GetStatus"),
            Self::SetRole { address, role, .. } => f
                .debug_struct("SetRole")
                .field("address", address)
                .field("role", role)
                .finish_non_exhaustive(),
            Self::Republish { .. } => f.write_str("Republish"),
            Self::Shutdown => f.write_str("Shutdown"),
        }
    }
}

/// Snapshot returned by [`NodeCommand::GetStatus`].
#[derive(Clone, Debug)]
pub struct NodeStatus {
    pub state: NodeState,
    pub address: Address,
    /// Accepted comments, posts and replies.
    pub comment_count: usize,
    /// Exchanges waiting for an answer.
    pub open_exchanges: usize,
}
