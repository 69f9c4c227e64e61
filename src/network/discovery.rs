//! Peer discovery adapter.
//!
//! The discovery mechanism (mDNS) reports peers through the [`PeerFound`]
//! callback; the [`DiscoveryAdapter`] funnels every report into a single
//! ordered [`DiscoveryQueue`] consumed by the session orchestrator.

use libp2p::{Multiaddr, PeerId};
use std::fmt;
use tokio::sync::mpsc;

/// A discovered peer and the addresses it was announced with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerAddress {
    /// Peer identity
    pub peer_id: PeerId,
    /// Announced addresses, in announcement order
    pub addresses: Vec<Multiaddr>,
}

impl PeerAddress {
    /// Create a peer address, dropping repeated addresses
    pub fn new(peer_id: PeerId, addresses: impl IntoIterator<Item = Multiaddr>) -> Self {
        let mut unique: Vec<Multiaddr> = Vec::new();
        for addr in addresses {
            if !unique.contains(&addr) {
                unique.push(addr);
            }
        }

        Self {
            peer_id,
            addresses: unique,
        }
    }
}

impl fmt::Display for PeerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{}: [", self.peer_id)?;
        for (i, addr) in self.addresses.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{addr}")?;
        }
        write!(f, "]}}")
    }
}

/// Receives "peer found" notifications from a discovery mechanism
pub trait PeerFound: Send + 'static {
    /// Called once per discovery signal
    fn peer_found(&self, peer: PeerAddress);
}

/// Producer side of the discovery queue
#[derive(Clone)]
pub struct DiscoveryAdapter {
    sender: mpsc::UnboundedSender<PeerAddress>,
}

/// Consumer side of the discovery queue
///
/// Unbounded: discovery is never stalled by a busy orchestrator.
pub struct DiscoveryQueue {
    receiver: mpsc::UnboundedReceiver<PeerAddress>,
}

impl DiscoveryAdapter {
    /// Create an adapter and the queue it feeds
    pub fn channel() -> (Self, DiscoveryQueue) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, DiscoveryQueue { receiver })
    }
}

impl PeerFound for DiscoveryAdapter {
    fn peer_found(&self, peer: PeerAddress) {
        log::debug!("Discovered {}", peer);
        if let Err(e) = self.sender.send(peer) {
            log::debug!("Discovery queue closed, dropping {}", e.0.peer_id);
        }
    }
}

impl DiscoveryQueue {
    /// Next discovered peer, waiting while the queue is empty
    ///
    /// Returns `None` once every adapter has been dropped.
    pub async fn next(&mut self) -> Option<PeerAddress> {
        self.receiver.recv().await
    }
}

/// Group one discovery response into one entry per peer
///
/// Peers keep the order of their first appearance.
pub fn group_discovered(records: Vec<(PeerId, Multiaddr)>) -> Vec<PeerAddress> {
    let mut grouped: Vec<(PeerId, Vec<Multiaddr>)> = Vec::new();

    for (peer_id, addr) in records {
        match grouped.iter_mut().find(|(id, _)| *id == peer_id) {
            Some((_, addrs)) => addrs.push(addr),
            None => grouped.push((peer_id, vec![addr])),
        }
    }

    grouped
        .into_iter()
        .map(|(peer_id, addrs)| PeerAddress::new(peer_id, addrs))
        .collect()
}
