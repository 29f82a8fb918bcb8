//! Integration tests for the pubsub transports.

use std::time::Duration;

use plebwire_crypto::signing::Keypair;
use plebwire_network::config::DEFAULT_MAX_MESSAGE_SIZE;
use plebwire_network::{GossipTransport, LocalHub, NetworkConfig, Transport};
use plebwire_types::PlebwireError;

type TestResult = std::result::Result<(), PlebwireError>;

// ---------------------------------------------------------------------------
// LocalHub
// ---------------------------------------------------------------------------

#[tokio::test]
async fn dropping_subscription_stops_delivery() -> TestResult {
    let hub = LocalHub::new(DEFAULT_MAX_MESSAGE_SIZE);
    let publisher = hub.transport();
    let listener = hub.transport();

    let sub = listener.subscribe("sub-topic").await?;
    assert_eq!(hub.subscriber_count("sub-topic"), 1);
    drop(sub);
    assert_eq!(hub.subscriber_count("sub-topic"), 0);

    publisher.publish("sub-topic", b"nobody hears this".to_vec()).await?;
    Ok(())
}

#[tokio::test]
async fn topics_are_isolated() -> TestResult {
    let hub = LocalHub::new(DEFAULT_MAX_MESSAGE_SIZE);
    let publisher = hub.transport();
    let listener = hub.transport();
    let mut a = listener.subscribe("a").await?;
    let mut b = listener.subscribe("b").await?;

    publisher.publish("b", b"for b".to_vec()).await?;
    publisher.publish("a", b"for a".to_vec()).await?;
    assert_eq!(a.recv().await, Some(b"for a".to_vec()));
    assert_eq!(b.recv().await, Some(b"for b".to_vec()));
    Ok(())
}

// ---------------------------------------------------------------------------
// GossipTransport
// ---------------------------------------------------------------------------

fn loopback() -> std::result::Result<NetworkConfig, PlebwireError> {
    let listen_addr = "/ip4/127.0.0.1/tcp/0".parse().map_err(|e| PlebwireError::ConfigError {
        reason: format!("{e}"),
    })?;
    Ok(NetworkConfig {
        listen_addr,
        heartbeat_interval_ms: 200,
        ..NetworkConfig::default()
    })
}

#[tokio::test]
async fn two_gossip_nodes_exchange_frames() -> TestResult {
    let a = GossipTransport::start(loopback()?, &Keypair::from_seed(&[1; 32])).await?;
    let b = GossipTransport::start(loopback()?, &Keypair::from_seed(&[2; 32])).await?;

    let mut a_addrs = Vec::new();
    for _ in 0..50 {
        a_addrs = a.listeners().await?;
        if !a_addrs.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    let addr = a_addrs.into_iter().next().ok_or(PlebwireError::NetworkError {
        reason: "node a never started listening".into(),
    })?;

    let mut sub = a.subscribe("gossip-test").await?;
    let _b_sub = b.subscribe("gossip-test").await?;
    b.dial(addr).await?;

    // The mesh needs a few heartbeats; resend until the frame arrives.
    let mut received = None;
    for attempt in 0..50u8 {
        b.publish("gossip-test", vec![attempt]).await?;
        if let Ok(Some(frame)) = tokio::time::timeout(Duration::from_millis(200), sub.recv()).await {
            received = Some(frame);
            break;
        }
    }
    assert!(received.is_some(), "frame never crossed the mesh");
    assert!(!b.connected_peers().await?.is_empty());
    Ok(())
}
