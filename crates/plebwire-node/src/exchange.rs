//! Challenge exchange state machines.
//!
//! ```text
//! publisher: Idle ─▶ RequestSent ─▶ ChallengeReceived ─▶ AnswerSent ─▶ Verified
//!                         └──────────────────────────────────────────────▲
//!            (any non-terminal state) ─▶ Cancelled
//!
//! responder: Listening ─▶ RequestReceived ─▶ ChallengeSent ─▶ AnswerReceived ─▶ VerificationSent
//!                               └────────────────────────────────────────────────────▲
//! ```
//!
//! `advance` rejects any other transition with `ProtocolError`.

use plebwire_crypto::signing::PublicKey;
use plebwire_protocol::publication::Publication;
use plebwire_types::{PlebwireError, Result};
use tokio::time::Instant;

fn illegal<S: std::fmt::Debug>(from: S, to: S) -> PlebwireError {
    PlebwireError::ProtocolError {
        reason: format!("illegal exchange transition {from:?} -> {to:?}"),
    }
}

// ---------------------------------------------------------------------------
// Publisher side
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PublisherState {
    Idle,
    RequestSent,
    ChallengeReceived,
    AnswerSent,
    Verified,
    Cancelled,
}

impl PublisherState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Verified | Self::Cancelled)
    }

    /// # Errors
    ///
    /// `ProtocolError` for a transition not in the diagram.
    pub fn advance(self, to: Self) -> Result<Self> {
        use PublisherState::*;
        let legal = match (self, to) {
            (Idle, RequestSent) => true,
            (RequestSent, ChallengeReceived | Verified) => true,
            (ChallengeReceived, AnswerSent) => true,
            (AnswerSent, Verified) => true,
            (from, Cancelled) => !from.is_terminal(),
            _ => false,
        };
        if legal {
            Ok(to)
        } else {
            Err(illegal(self, to))
        }
    }
}

// ---------------------------------------------------------------------------
// Responder side
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResponderState {
    Listening,
    RequestReceived,
    ChallengeSent,
    AnswerReceived,
    VerificationSent,
}

impl ResponderState {
    /// # Errors
    ///
    /// `ProtocolError` for a transition not in the diagram.
    pub fn advance(self, to: Self) -> Result<Self> {
        use ResponderState::*;
        let legal = matches!(
            (self, to),
            (Listening, RequestReceived)
                | (RequestReceived, ChallengeSent | VerificationSent)
                | (ChallengeSent, AnswerReceived)
                | (AnswerReceived, VerificationSent)
        );
        if legal {
            Ok(to)
        } else {
            Err(illegal(self, to))
        }
    }
}

/// Responder bookkeeping for one challenged request, keyed by request
/// id until the verification goes out.
#[derive(Debug)]
pub struct ExchangeContext {
    pub state: ResponderState,
    pub publication: Publication,
    /// Key that signed the request; answers must come from it.
    pub signer: PublicKey,
    pub created_at: Instant,
}

impl ExchangeContext {
    pub fn is_expired(&self, now: Instant, ttl: std::time::Duration) -> bool {
        now.saturating_duration_since(self.created_at) > ttl
    }
}
