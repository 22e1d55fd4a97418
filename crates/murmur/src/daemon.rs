//! Single-node daemon over UDP.
//!
//! The node is owned by this task alone; a `tokio::time::interval` supplies
//! ticks and the UDP receiver task only fills the inbound queue.

use anyhow::Result;
use murmur_common::NodeIdentity;
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;

use crate::config::ProtocolConfig;
use crate::node::Node;
use crate::observer::TracingObserver;
use crate::transport::UdpTransport;

/// Ticks between periodic status lines
const STATUS_EVERY_TICKS: u64 = 50;

/// Run one node until `shutdown` fires
pub async fn run_node(
    identity: NodeIdentity,
    bootstrap: NodeIdentity,
    protocol: ProtocolConfig,
    shutdown: broadcast::Sender<()>,
) -> Result<()> {
    let (transport, receiver) = UdpTransport::bind(identity, shutdown.subscribe()).await?;
    let identity = transport.local_identity();

    let interval = Duration::from_millis(protocol.tick_interval_ms);
    let mut node = Node::new(
        identity,
        bootstrap,
        protocol,
        transport,
        TracingObserver,
        StdRng::from_os_rng(),
    );

    tracing::info!(
        node = %identity,
        introducer = %bootstrap,
        interval = ?interval,
        "🗣️ Membership node started"
    );
    node.start();

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut shutdown_rx = shutdown.subscribe();
    let mut ticks: u64 = 0;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                node.tick();
                ticks += 1;

                if ticks % STATUS_EVERY_TICKS == 0 {
                    let snapshot = node.snapshot();
                    tracing::debug!(
                        node = %identity,
                        state = ?snapshot.join_state,
                        heartbeat = snapshot.heartbeat,
                        members = snapshot.members.len(),
                        suspects = ?snapshot.suspects,
                        tombstones = snapshot.tombstones,
                        "Membership status"
                    );
                }
            }
            _ = shutdown_rx.recv() => {
                tracing::info!(node = %identity, "🗣️ Membership node shutting down");
                break;
            }
        }
    }

    if let Err(e) = receiver.await {
        tracing::warn!(error = %e, "UDP receiver task ended abnormally");
    }

    Ok(())
}
