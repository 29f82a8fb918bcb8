//! Publisher side of the challenge exchange.
//!
//! [`Publisher::start`] encrypts the publication to the subplebbit,
//! subscribes to the subplebbit topic and publishes the request. The
//! returned [`PendingExchange`] then yields the subplebbit's challenge
//! and verification through [`PendingExchange::next_event`]. Frames for
//! other request ids, frames that fail to decode, and challenges or
//! verifications not signed by the subplebbit are dropped. A signed
//! verification whose payload does not check out ends the exchange
//! with an error.

use std::sync::Arc;
use std::time::Duration;

use plebwire_crypto::hash::compute_content_id;
use plebwire_crypto::signing::{Keypair, PublicKey};
use plebwire_network::{Subscription, Transport};
use plebwire_protocol::encryption::{decrypt_json, encrypt_json};
use plebwire_protocol::message::{
    request_id_for_signer, AnswersPayload, ChallengeAnswerMessage, ChallengePrompt, ChallengeRequestMessage,
    ChallengeVerificationMessage, ChallengesPayload, PubsubMessage, VerificationPayload,
};
use plebwire_protocol::publication::Publication;
use plebwire_protocol::record::{to_json, CommentRecord, CommentUpdateRecord};
use plebwire_protocol::validation::validate_comment_update;
use plebwire_types::config::ProtocolConfig;
use plebwire_types::{ContentId, PlebwireError, RequestId, Result};
use tokio::time::Instant;

use crate::challenge::TEXT_PLAIN;
use crate::exchange::PublisherState;

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// A comment the subplebbit accepted, as returned in the verification.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AcceptedComment {
    pub cid: ContentId,
    pub record: CommentRecord,
    pub update: CommentUpdateRecord,
}

/// Outcome reported by the subplebbit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Verification {
    pub challenge_success: bool,
    pub challenge_errors: Option<Vec<Option<String>>>,
    pub reason: Option<String>,
    /// Present when a comment was accepted.
    pub comment: Option<AcceptedComment>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ExchangeEvent {
    Challenge(Vec<ChallengePrompt>),
    Verified(Verification),
}

// ---------------------------------------------------------------------------
// Publisher
// ---------------------------------------------------------------------------

pub struct Publisher {
    transport: Arc<dyn Transport>,
    config: ProtocolConfig,
}

impl Publisher {
    pub fn new(transport: Arc<dyn Transport>, config: ProtocolConfig) -> Self {
        Self { transport, config }
    }

    /// Sends a challenge request for `publication`.
    ///
    /// With `anonymize_pubsub_signer` the request is signed by a fresh
    /// key and the request id is derived from it; otherwise the author
    /// key signs and the id is random.
    ///
    /// # Errors
    ///
    /// `InvalidPublication` if `subplebbit` is not the key of the
    /// publication's subplebbit; encryption, signing and transport
    /// failures otherwise.
    pub async fn start(&self, publication: Publication, subplebbit: &PublicKey, author: &Keypair) -> Result<PendingExchange> {
        let address = subplebbit.address();
        if *publication.subplebbit_address() != address {
            return Err(PlebwireError::InvalidPublication {
                reason: format!("publication is addressed to {}, not {address}", publication.subplebbit_address()),
            });
        }

        let (signer, request_id) = if self.config.anonymize_pubsub_signer {
            let signer = Keypair::generate();
            let id = request_id_for_signer(&signer.public_key());
            (signer, id)
        } else {
            (Keypair::from_seed(&author.seed_bytes()), RequestId::generate())
        };

        let encrypted = encrypt_json(&publication, &signer, subplebbit, &self.config.encryption_type)?;
        let request = ChallengeRequestMessage::create(
            request_id.clone(),
            vec![TEXT_PLAIN.to_string()],
            encrypted,
            &self.config,
            &signer,
        )?;
        let frame = PubsubMessage::from(request).encode()?;

        let topic = address.topic();
        let subscription = self.transport.subscribe(&topic).await?;
        self.transport.publish(&topic, frame.clone()).await?;
        let state = PublisherState::Idle.advance(PublisherState::RequestSent)?;
        tracing::info!(%request_id, kind = publication.kind(), subplebbit = %address, "challenge request sent");

        Ok(PendingExchange {
            transport: Arc::clone(&self.transport),
            config: self.config.clone(),
            topic,
            subscription: Some(subscription),
            signer,
            subplebbit: *subplebbit,
            request_id,
            request_frame: frame,
            state,
        })
    }

    /// Runs a whole exchange, answering every challenge with `answer`.
    ///
    /// # Errors
    ///
    /// As [`start`](Self::start) and [`PendingExchange::next_event`].
    pub async fn publish_with<F>(
        &self,
        publication: Publication,
        subplebbit: &PublicKey,
        author: &Keypair,
        mut answer: F,
    ) -> Result<Verification>
    where
        F: FnMut(&[ChallengePrompt]) -> Vec<String>,
    {
        let mut exchange = self.start(publication, subplebbit, author).await?;
        loop {
            match exchange.next_event().await? {
                ExchangeEvent::Challenge(prompts) => exchange.answer(answer(&prompts)).await?,
                ExchangeEvent::Verified(verification) => return Ok(verification),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// PendingExchange
// ---------------------------------------------------------------------------

/// An in-flight exchange. Dropping it releases the subscription.
pub struct PendingExchange {
    transport: Arc<dyn Transport>,
    config: ProtocolConfig,
    topic: String,
    subscription: Option<Subscription>,
    signer: Keypair,
    subplebbit: PublicKey,
    request_id: RequestId,
    request_frame: Vec<u8>,
    state: PublisherState,
}

impl PendingExchange {
    pub fn request_id(&self) -> &RequestId {
        &self.request_id
    }

    pub fn state(&self) -> PublisherState {
        self.state
    }

    /// Waits for the next challenge or the verification.
    ///
    /// # Errors
    ///
    /// - `Timeout` if nothing arrives within `challenge_timeout_secs`;
    ///   the exchange is cancelled.
    /// - `SignatureError` / `EncryptionError` if a verification signed
    ///   by the subplebbit carries a payload that does not decrypt or
    ///   validate; the exchange is cancelled.
    /// - `Cancelled` if the exchange already finished.
    pub async fn next_event(&mut self) -> Result<ExchangeEvent> {
        let deadline = Instant::now() + Duration::from_secs(self.config.challenge_timeout_secs);
        loop {
            let Some(subscription) = self.subscription.as_mut() else {
                return Err(PlebwireError::Cancelled {
                    reason: format!("exchange {} is {:?}", self.request_id, self.state),
                });
            };
            let received = tokio::time::timeout_at(deadline, subscription.recv()).await;
            let frame = match received {
                Ok(Some(frame)) => frame,
                Ok(None) => {
                    self.cancel();
                    return Err(PlebwireError::NetworkError {
                        reason: format!("subscription to {} closed", self.topic),
                    });
                }
                Err(_) => {
                    tracing::warn!(request_id = %self.request_id, state = ?self.state, "exchange timed out");
                    self.cancel();
                    return Err(PlebwireError::Timeout {
                        reason: format!("no reply to {} within {}s", self.request_id, self.config.challenge_timeout_secs),
                    });
                }
            };

            let message = match PubsubMessage::decode(&frame) {
                Ok(m) => m,
                Err(e) => {
                    tracing::debug!(%e, "undecodable frame dropped");
                    continue;
                }
            };
            if *message.request_id() != self.request_id {
                continue;
            }

            let authentic = self.from_subplebbit(&message);
            match message {
                PubsubMessage::Challenge(challenge) => {
                    if self.state != PublisherState::RequestSent {
                        tracing::debug!(request_id = %self.request_id, "duplicate challenge ignored");
                        continue;
                    }
                    if !authentic {
                        tracing::warn!(request_id = %self.request_id, "challenge not signed by the subplebbit, dropped");
                        continue;
                    }
                    let payload: ChallengesPayload = match decrypt_json(&challenge.encrypted, &self.signer, &self.subplebbit) {
                        Ok(p) => p,
                        Err(e) => {
                            tracing::warn!(request_id = %self.request_id, %e, "challenge payload dropped");
                            continue;
                        }
                    };
                    self.state = self.state.advance(PublisherState::ChallengeReceived)?;
                    tracing::info!(request_id = %self.request_id, count = payload.challenges.len(), "challenge received");
                    return Ok(ExchangeEvent::Challenge(payload.challenges));
                }
                PubsubMessage::ChallengeVerification(verification) => {
                    if !matches!(self.state, PublisherState::RequestSent | PublisherState::AnswerSent) {
                        tracing::debug!(request_id = %self.request_id, state = ?self.state, "early verification ignored");
                        continue;
                    }
                    if !authentic {
                        tracing::warn!(request_id = %self.request_id, "verification not signed by the subplebbit, dropped");
                        continue;
                    }
                    let outcome = match self.open_verification(verification) {
                        Ok(outcome) => outcome,
                        Err(e) => {
                            self.cancel();
                            return Err(e);
                        }
                    };
                    self.state = self.state.advance(PublisherState::Verified)?;
                    self.subscription = None;
                    tracing::info!(
                        request_id = %self.request_id,
                        success = outcome.challenge_success,
                        reason = outcome.reason.as_deref().unwrap_or(""),
                        "verification received"
                    );
                    return Ok(ExchangeEvent::Verified(outcome));
                }
                PubsubMessage::ChallengeRequest(_) | PubsubMessage::ChallengeAnswer(_) => continue,
            }
        }
    }

    /// Sends answers to the received challenge.
    ///
    /// # Errors
    ///
    /// `ProtocolError` unless a challenge is pending; encryption and
    /// transport failures otherwise.
    pub async fn answer(&mut self, answers: Vec<String>) -> Result<()> {
        let next = self.state.advance(PublisherState::AnswerSent)?;
        let encrypted = encrypt_json(
            &AnswersPayload {
                challenge_answers: answers,
            },
            &self.signer,
            &self.subplebbit,
            &self.config.encryption_type,
        )?;
        let message = ChallengeAnswerMessage::create(self.request_id.clone(), encrypted, &self.config, &self.signer)?;
        self.transport
            .publish(&self.topic, PubsubMessage::from(message).encode()?)
            .await?;
        self.state = next;
        tracing::info!(request_id = %self.request_id, "challenge answer sent");
        Ok(())
    }

    /// Publishes the original request frame again.
    ///
    /// The subplebbit suppresses duplicates, so this is safe after a
    /// lost frame.
    ///
    /// # Errors
    ///
    /// `Cancelled` once the exchange finished; transport failures.
    pub async fn resend(&self) -> Result<()> {
        if self.state.is_terminal() {
            return Err(PlebwireError::Cancelled {
                reason: format!("exchange {} is {:?}", self.request_id, self.state),
            });
        }
        self.transport.publish(&self.topic, self.request_frame.clone()).await?;
        tracing::debug!(request_id = %self.request_id, "challenge request resent");
        Ok(())
    }

    /// Aborts the exchange and releases the subscription.
    pub fn cancel(&mut self) {
        if let Ok(state) = self.state.advance(PublisherState::Cancelled) {
            self.state = state;
            tracing::debug!(request_id = %self.request_id, "exchange cancelled");
        }
        self.subscription = None;
    }

    fn from_subplebbit(&self, message: &PubsubMessage) -> bool {
        message.verify_signature() && message.signer_public_key().map_or(false, |pk| pk == self.subplebbit)
    }

    fn open_verification(&self, message: ChallengeVerificationMessage) -> Result<Verification> {
        let comment = match &message.encrypted {
            Some(envelope) => {
                let payload: VerificationPayload = decrypt_json(envelope, &self.signer, &self.subplebbit)?;
                let cid = compute_content_id(&to_json(&payload.comment)?);
                validate_comment_update(&payload.comment_update, &self.subplebbit.address(), &cid)?;
                Some(AcceptedComment {
                    cid,
                    record: payload.comment,
                    update: payload.comment_update,
                })
            }
            None => None,
        };
        Ok(Verification {
            challenge_success: message.challenge_success,
            challenge_errors: message.challenge_errors,
            reason: message.reason,
            comment,
        })
    }
}

impl std::fmt::Debug for PendingExchange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingExchange")
            .field("request_id", &self.request_id)
            .field("state", &self.state)
            .field("topic", &self.topic)
            .finish_non_exhaustive()
    }
}
