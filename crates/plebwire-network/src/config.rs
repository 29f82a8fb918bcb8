//! Network configuration for the gossipsub transport.
//!
//! Kept in this crate rather than `plebwire-types` so the shared types
//! crate does not depend on `libp2p::Multiaddr`.

use libp2p::multiaddr::Protocol;
use libp2p::Multiaddr;
use serde::{Deserialize, Serialize};

use plebwire_types::{PlebwireError, Result};

/// Largest pubsub frame accepted or sent (1 MiB).
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 1_048_576;

/// Transport settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Default: `/ip4/0.0.0.0/tcp/0`.
    #[serde(with = "multiaddr_serde")]
    pub listen_addr: Multiaddr,

    /// Peers dialed on startup. Gossipsub builds its mesh from these.
    #[serde(with = "multiaddr_vec_serde")]
    pub bootstrap_nodes: Vec<Multiaddr>,

    /// Frames larger than this are neither published nor accepted.
    pub max_message_size: usize,

    /// Seconds before an idle connection is closed.
    pub idle_timeout_secs: u64,

    /// Gossipsub heartbeat interval in milliseconds.
    pub heartbeat_interval_ms: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        let mut listen_addr = Multiaddr::empty();
        listen_addr.push(Protocol::Ip4(std::net::Ipv4Addr::UNSPECIFIED));
        listen_addr.push(Protocol::Tcp(0));

        Self {
            listen_addr,
            bootstrap_nodes: Vec::new(),
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            idle_timeout_secs: 60,
            heartbeat_interval_ms: 1_000,
        }
    }
}

impl NetworkConfig {
    /// Validates all configuration values.
    ///
    /// # Errors
    ///
    /// `ConfigError` naming the first out-of-range value.
    pub fn validate(&self) -> Result<()> {
        if self.max_message_size == 0 {
            return Err(PlebwireError::ConfigError {
                reason: "max_message_size must be greater than 0".into(),
            });
        }
        if self.idle_timeout_secs == 0 {
            return Err(PlebwireError::ConfigError {
                reason: "idle_timeout_secs must be greater than 0".into(),
            });
        }
        if self.heartbeat_interval_ms == 0 {
            return Err(PlebwireError::ConfigError {
                reason: "heartbeat_interval_ms must be greater than 0".into(),
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Serde helpers: Multiaddr is serialized as its string form
// ---------------------------------------------------------------------------

mod multiaddr_serde {
    use libp2p::Multiaddr;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(addr: &Multiaddr, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&addr.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Multiaddr, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

mod multiaddr_vec_serde {
    use libp2p::Multiaddr;
    use serde::ser::SerializeSeq;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(addrs: &[Multiaddr], serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(addrs.len()))?;
        for addr in addrs {
            seq.serialize_element(&addr.to_string())?;
        }
        seq.end()
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<Multiaddr>, D::Error> {
        let strings: Vec<String> = Vec::deserialize(deserializer)?;
        strings
            .into_iter()
            .map(|s| s.parse().map_err(serde::de::Error::custom))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(NetworkConfig::default().validate().is_ok());
    }

    #[test]
    fn zero_values_rejected() {
        let mut config = NetworkConfig::default();
        config.max_message_size = 0;
        assert!(config.validate().is_err());

        let mut config = NetworkConfig::default();
        config.heartbeat_interval_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn multiaddrs_round_trip_as_strings() -> std::result::Result<(), serde_json::Error> {
        let json = r#"{"listen_addr":"/ip4/127.0.0.1/tcp/4001","bootstrap_nodes":["/ip4/10.0.0.1/tcp/4001"]}"#;
        let config: NetworkConfig = serde_json::from_str(json)?;
        assert_eq!(config.listen_addr.to_string(), "/ip4/127.0.0.1/tcp/4001");
        assert_eq!(config.bootstrap_nodes.len(), 1);
        assert_eq!(config.max_message_size, DEFAULT_MAX_MESSAGE_SIZE);
        Ok(())
    }
}
