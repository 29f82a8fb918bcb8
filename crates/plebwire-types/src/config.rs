//! Protocol configuration with sensible defaults.
//!
//! Every operational knob of the challenge exchange, the update
//! aggregator and the client poller is centralized here.

use serde::{Deserialize, Serialize};

use crate::{PlebwireError, Result};

/// Default time buckets for comment-update paths, in seconds:
/// one day, one week, one month, one century.
pub const DEFAULT_POST_UPDATE_BUCKETS: [u64; 4] = [86_400, 604_800, 2_592_000, 3_153_600_000];

/// Encryption scheme tag used unless configured otherwise.
pub const DEFAULT_ENCRYPTION_TYPE: &str = "ed25519-aes-gcm";

/// Protocol configuration shared by publishers, subplebbit nodes and
/// pollers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolConfig {
    /// Maximum number of entries per page.
    pub page_size: usize,

    /// Upper bound on each publisher wait (challenge or verification),
    /// in seconds.
    pub challenge_timeout_secs: u64,

    /// Ascending bucket sizes in seconds. A comment lives under the
    /// smallest bucket that is at least the age of its post.
    pub post_update_buckets: Vec<u64>,

    /// When `true`, pubsub messages are signed with a fresh key per
    /// exchange instead of the author key.
    pub anonymize_pubsub_signer: bool,

    /// Number of recently seen request ids remembered by a subplebbit
    /// node for duplicate suppression.
    pub request_cache_size: usize,

    /// Maximum tolerated distance between a message timestamp and the
    /// local clock, in seconds. `0` disables the check.
    pub max_timestamp_skew_secs: u64,

    /// Interval between poller fetches, in milliseconds.
    pub poll_interval_ms: u64,

    /// Protocol version string carried on every message and record.
    pub protocol_version: String,

    /// User agent string carried on every pubsub message.
    pub user_agent: String,

    /// Encryption scheme tag used for outgoing payloads.
    pub encryption_type: String,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            page_size: 50,
            challenge_timeout_secs: 60,
            post_update_buckets: DEFAULT_POST_UPDATE_BUCKETS.to_vec(),
            anonymize_pubsub_signer: true,
            request_cache_size: 10_000,
            max_timestamp_skew_secs: 300,
            poll_interval_ms: 1_000,
            protocol_version: "1.0.0".into(),
            user_agent: concat!("plebwire/", env!("CARGO_PKG_VERSION")).into(),
            encryption_type: DEFAULT_ENCRYPTION_TYPE.into(),
        }
    }
}

impl ProtocolConfig {
    /// Validates all configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if any value is outside its acceptable range.
    pub fn validate(&self) -> Result<()> {
        if self.page_size == 0 {
            return Err(PlebwireError::ConfigError {
                reason: "page_size must be greater than 0".into(),
            });
        }

        if self.challenge_timeout_secs == 0 {
            return Err(PlebwireError::ConfigError {
                reason: "challenge_timeout_secs must be greater than 0".into(),
            });
        }

        if self.post_update_buckets.is_empty() {
            return Err(PlebwireError::ConfigError {
                reason: "post_update_buckets must not be empty".into(),
            });
        }

        if self
            .post_update_buckets
            .windows(2)
            .any(|w| w[0] >= w[1])
        {
            return Err(PlebwireError::ConfigError {
                reason: "post_update_buckets must be strictly ascending".into(),
            });
        }

        if self.request_cache_size == 0 {
            return Err(PlebwireError::ConfigError {
                reason: "request_cache_size must be greater than 0".into(),
            });
        }

        if self.poll_interval_ms == 0 {
            return Err(PlebwireError::ConfigError {
                reason: "poll_interval_ms must be greater than 0".into(),
            });
        }

        if self.encryption_type.is_empty() {
            return Err(PlebwireError::ConfigError {
                reason: "encryption_type must not be empty".into(),
            });
        }

        Ok(())
    }

    /// Returns the bucket a post of the given age (seconds) belongs to.
    ///
    /// Ages beyond the largest bucket stay in the largest bucket.
    pub fn bucket_for_age(&self, age_secs: u64) -> u64 {
        self.post_update_buckets
            .iter()
            .copied()
            .find(|b| *b >= age_secs)
            .or_else(|| self.post_update_buckets.last().copied())
            .unwrap_or(DEFAULT_POST_UPDATE_BUCKETS[0])
    }
}
