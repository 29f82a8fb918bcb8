//! Subplebbit node, publisher and poller for plebwire.
//!
//! - [`node::SubplebbitNode`] answers challenge requests on its topic
//!   and keeps the subplebbit's records current.
//! - [`publisher::Publisher`] drives the author side of an exchange.
//! - [`poller::CommentPoller`] follows a comment's signed updates.

pub mod aggregator;
pub mod challenge;
pub mod command;
pub mod content;
pub mod exchange;
pub mod node;
pub mod pages;
pub mod poller;
pub mod publisher;
mod responder;
pub mod sort;

pub use aggregator::{Aggregator, SubplebbitProfile};
pub use challenge::{ChallengePolicy, ChallengeResult, NoChallenge, TextMathChallenge};
pub use command::{NodeCommand, NodeStatus};
pub use node::{NodeState, SubplebbitNode, SubplebbitSettings};
pub use poller::{resolve_subplebbit, CommentPoller, CommentUpdates};
pub use publisher::{ExchangeEvent, PendingExchange, Publisher, Verification};
