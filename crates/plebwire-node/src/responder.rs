//! Subplebbit side of the challenge exchange.
//!
//! The responder is driven by the node event loop, one frame at a time.
//! It owns the open exchanges (keyed by request id) and the duplicate
//! request cache, so no locking is needed here.
//!
//! Every request that passes signature checks gets exactly one
//! verification: a failure if decryption, validation or the challenge
//! fails, otherwise the result of accepting the publication.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use plebwire_crypto::signing::{Keypair, PublicKey};
use plebwire_network::Transport;
use plebwire_protocol::encryption::{decrypt_json, encrypt_json};
use plebwire_protocol::message::{
    AnswersPayload, ChallengeAnswerMessage, ChallengeMessage, ChallengeRequestMessage, ChallengeVerificationMessage,
    ChallengesPayload, PubsubMessage, VerificationOutcome,
};
use plebwire_protocol::publication::Publication;
use plebwire_protocol::request_cache::RequestCache;
use plebwire_protocol::validation::{validate_publication, validate_timestamp};
use plebwire_types::config::ProtocolConfig;
use plebwire_types::{Address, PlebwireError, RequestId, Result, Timestamp};
use tokio::time::Instant;

use crate::aggregator::Aggregator;
use crate::challenge::ChallengePolicy;
use crate::content::ContentPublisher;
use crate::exchange::{ExchangeContext, ResponderState};

pub(crate) struct Responder {
    keypair: Keypair,
    address: Address,
    transport: Arc<dyn Transport>,
    policy: Arc<dyn ChallengePolicy>,
    content: ContentPublisher,
    aggregator: Arc<Aggregator>,
    config: ProtocolConfig,
    seen: RequestCache,
    exchanges: HashMap<RequestId, ExchangeContext>,
}

impl Responder {
    pub(crate) fn new(
        keypair: Keypair,
        transport: Arc<dyn Transport>,
        policy: Arc<dyn ChallengePolicy>,
        content: ContentPublisher,
        aggregator: Arc<Aggregator>,
        config: ProtocolConfig,
    ) -> Self {
        Self {
            address: keypair.address(),
            keypair,
            transport,
            policy,
            content,
            aggregator,
            seen: RequestCache::new(config.request_cache_size),
            config,
            exchanges: HashMap::new(),
        }
    }

    pub(crate) fn open_exchanges(&self) -> usize {
        self.exchanges.len()
    }

    /// Handles one frame from the subplebbit topic.
    pub(crate) async fn handle_frame(&mut self, frame: &[u8]) {
        let message = match PubsubMessage::decode(frame) {
            Ok(m) => m,
            Err(e) => {
                tracing::debug!(%e, "undecodable frame dropped");
                return;
            }
        };
        if !message.verify_signature() {
            tracing::warn!(request_id = %message.request_id(), kind = %message.kind(), "bad message signature, dropped");
            return;
        }
        let signer = match message.signer_public_key() {
            Ok(pk) => pk,
            Err(e) => {
                tracing::warn!(%e, "unusable signer key, dropped");
                return;
            }
        };

        let result = match message {
            PubsubMessage::ChallengeRequest(request) => self.on_request(request, signer).await,
            PubsubMessage::ChallengeAnswer(answer) => self.on_answer(answer, signer).await,
            // our own outgoing kinds, or another responder on the topic
            PubsubMessage::Challenge(_) | PubsubMessage::ChallengeVerification(_) => Ok(()),
        };
        if let Err(e) = result {
            tracing::error!(%e, "failed to publish exchange reply");
        }
    }

    /// Drops exchanges whose publisher has certainly given up.
    pub(crate) fn expire(&mut self) {
        let ttl = Duration::from_secs(self.config.challenge_timeout_secs);
        let now = Instant::now();
        self.exchanges.retain(|id, ctx| {
            let keep = !ctx.is_expired(now, ttl);
            if !keep {
                tracing::debug!(request_id = %id, "unanswered exchange expired");
            }
            keep
        });
    }

    // -----------------------------------------------------------------------
    // Request
    // -----------------------------------------------------------------------

    async fn on_request(&mut self, request: ChallengeRequestMessage, signer: PublicKey) -> Result<()> {
        let id = request.challenge_request_id.clone();
        if self.seen.check_and_insert(&id).is_err() {
            tracing::debug!(request_id = %id, "duplicate request ignored");
            return Ok(());
        }
        let state = ResponderState::Listening.advance(ResponderState::RequestReceived)?;

        let publication: Publication = match decrypt_json(&request.encrypted, &self.keypair, &signer) {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(request_id = %id, %e, "request payload unreadable");
                state.advance(ResponderState::VerificationSent)?;
                return self.send_verification(id, failure(e.to_string(), None)).await;
            }
        };
        tracing::info!(request_id = %id, kind = publication.kind(), "challenge request received");

        let now = Timestamp::now();
        let checked = validate_timestamp(request.timestamp, now, self.config.max_timestamp_skew_secs)
            .and_then(|()| validate_publication(&publication, &self.address, &self.config, now));
        if let Err(e) = checked {
            tracing::info!(request_id = %id, %e, "publication rejected");
            state.advance(ResponderState::VerificationSent)?;
            return self.send_verification(id, failure(e.to_string(), None)).await;
        }

        let prompts = self.policy.challenges(&publication);
        if prompts.is_empty() {
            state.advance(ResponderState::VerificationSent)?;
            return self.accept(id, signer, publication).await;
        }

        let encrypted = encrypt_json(
            &ChallengesPayload { challenges: prompts },
            &self.keypair,
            &signer,
            &self.config.encryption_type,
        )?;
        let challenge = ChallengeMessage::create(id.clone(), encrypted, &self.config, &self.keypair)?;
        self.publish(PubsubMessage::from(challenge)).await?;
        tracing::info!(request_id = %id, "challenge sent");

        self.exchanges.insert(
            id,
            ExchangeContext {
                state: state.advance(ResponderState::ChallengeSent)?,
                publication,
                signer,
                created_at: Instant::now(),
            },
        );
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Answer
    // -----------------------------------------------------------------------

    async fn on_answer(&mut self, answer: ChallengeAnswerMessage, signer: PublicKey) -> Result<()> {
        let id = answer.challenge_request_id.clone();
        match self.exchanges.get(&id) {
            None => {
                tracing::debug!(request_id = %id, "answer for unknown request ignored");
                return Ok(());
            }
            Some(ctx) if ctx.signer != signer => {
                tracing::warn!(request_id = %id, "answer signed by a foreign key, dropped");
                return Ok(());
            }
            Some(_) => {}
        }
        let Some(ctx) = self.exchanges.remove(&id) else {
            return Ok(());
        };
        let state = ctx.state.advance(ResponderState::AnswerReceived)?;
        state.advance(ResponderState::VerificationSent)?;

        let answers: AnswersPayload = match decrypt_json(&answer.encrypted, &self.keypair, &signer) {
            Ok(a) => a,
            Err(e) => {
                tracing::warn!(request_id = %id, %e, "answer payload unreadable");
                return self.send_verification(id, failure(e.to_string(), None)).await;
            }
        };

        let graded = self.policy.verify(&ctx.publication, &answers.challenge_answers);
        if !graded.success {
            tracing::info!(request_id = %id, "challenge failed");
            let reason = PlebwireError::ChallengeFailure {
                reason: "wrong challenge answers".into(),
            };
            return self
                .send_verification(id, failure(reason.to_string(), Some(graded.errors)))
                .await;
        }
        self.accept(id, signer, ctx.publication).await
    }

    // -----------------------------------------------------------------------
    // Acceptance
    // -----------------------------------------------------------------------

    async fn accept(&mut self, id: RequestId, signer: PublicKey, publication: Publication) -> Result<()> {
        let kind = publication.kind();
        let accepted = match publication {
            Publication::Comment(comment) => self.content.publish(comment).await.map(Some),
            Publication::Vote(vote) => self.aggregator.on_vote(&vote).await.map(|()| None),
            Publication::CommentEdit(edit) => self.aggregator.on_edit(&edit).await.map(|()| None),
        };

        let outcome = match accepted {
            Ok(published) => {
                let encrypted = published
                    .map(|p| encrypt_json(&p.into_payload(), &self.keypair, &signer, &self.config.encryption_type))
                    .transpose();
                match encrypted {
                    Ok(encrypted) => {
                        tracing::info!(request_id = %id, kind, "publication accepted");
                        VerificationOutcome {
                            challenge_success: true,
                            challenge_errors: None,
                            reason: None,
                            encrypted,
                        }
                    }
                    Err(e) => {
                        tracing::error!(request_id = %id, kind, %e, "accepted comment could not be sealed");
                        failure(e.to_string(), None)
                    }
                }
            }
            Err(e) => {
                tracing::warn!(request_id = %id, kind, %e, "publication could not be accepted");
                failure(e.to_string(), None)
            }
        };
        self.send_verification(id, outcome).await
    }

    async fn send_verification(&self, id: RequestId, outcome: VerificationOutcome) -> Result<()> {
        let success = outcome.challenge_success;
        let message = ChallengeVerificationMessage::create(id.clone(), outcome, &self.config, &self.keypair)?;
        self.publish(PubsubMessage::from(message)).await?;
        tracing::debug!(request_id = %id, success, "verification sent");
        Ok(())
    }

    async fn publish(&self, message: PubsubMessage) -> Result<()> {
        self.transport.publish(&self.address.topic(), message.encode()?).await
    }
}

fn failure(reason: String, errors: Option<Vec<Option<String>>>) -> VerificationOutcome {
    VerificationOutcome {
        challenge_success: false,
        challenge_errors: errors,
        reason: Some(reason),
        encrypted: None,
    }
}
