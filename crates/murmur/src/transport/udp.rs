//! UDP datagram transport.
//!
//! A background receiver task pushes every datagram into an unbounded
//! channel that acts as the node's inbound queue. Sends never wait: if the
//! socket is not immediately writable the datagram is dropped, which the
//! protocol treats like any other packet loss. `bind` waits for the first
//! write readiness so the join request sent right after it is not lost.

use anyhow::{Context, Result};
use bytes::Bytes;
use murmur_common::constants::MAX_DATAGRAM_SIZE;
use murmur_common::{MurmurError, NodeIdentity};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use super::Transport;

/// UDP transport bound to one node's identity
pub struct UdpTransport {
    socket: Arc<UdpSocket>,
    local: NodeIdentity,
    inbound: Mutex<mpsc::UnboundedReceiver<Bytes>>,
}

impl UdpTransport {
    /// Bind to `identity` and spawn the receiver task
    pub async fn bind(
        identity: NodeIdentity,
        shutdown: broadcast::Receiver<()>,
    ) -> Result<(Self, JoinHandle<()>)> {
        let socket = UdpSocket::bind(identity.socket_addr())
            .await
            .with_context(|| format!("Failed to bind UDP socket on {}", identity))?;
        // try_send_to fails with WouldBlock until the reactor has seen the
        // socket become writable once
        socket
            .writable()
            .await
            .context("UDP socket never became writable")?;
        let socket = Arc::new(socket);

        let local = NodeIdentity::try_from(socket.local_addr()?)
            .context("Bound socket has no IPv4 address")?;

        let (tx, rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(run_receiver(socket.clone(), tx, shutdown));

        tracing::info!(addr = %local, "👂 UDP transport listening");

        Ok((
            Self {
                socket,
                local,
                inbound: Mutex::new(rx),
            },
            handle,
        ))
    }

    /// Actual bound identity (resolves port 0)
    pub fn local_identity(&self) -> NodeIdentity {
        self.local
    }
}

impl Transport for UdpTransport {
    fn send(
        &self,
        _from: NodeIdentity,
        to: NodeIdentity,
        payload: Bytes,
    ) -> Result<(), MurmurError> {
        self.socket
            .try_send_to(&payload, to.socket_addr())
            .map(|_| ())
            .map_err(|e| MurmurError::Transport(format!("send to {} failed: {}", to, e)))
    }

    fn poll_inbound(&self, _me: NodeIdentity) -> Vec<Bytes> {
        let mut rx = self.inbound.lock();
        let mut drained = Vec::new();
        while let Ok(payload) = rx.try_recv() {
            drained.push(payload);
        }
        drained
    }
}

async fn run_receiver(
    socket: Arc<UdpSocket>,
    tx: mpsc::UnboundedSender<Bytes>,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];

    loop {
        tokio::select! {
            result = socket.recv_from(&mut buf) => {
                match result {
                    Ok((len, addr)) => {
                        tracing::trace!(from = %addr, len, "Datagram received");
                        if tx.send(Bytes::copy_from_slice(&buf[..len])).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "UDP receive error");
                    }
                }
            }
            _ = shutdown.recv() => {
                tracing::info!("👂 UDP receiver shutting down");
                break;
            }
        }
    }
}
