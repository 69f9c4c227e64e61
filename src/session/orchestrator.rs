//! The control loop turning discovered peers into chat sessions.
//!
//! Peers are serviced one at a time, in discovery order: connect, probe
//! latency, open a chat stream, hand the stream to a new session. Failures
//! abandon the current peer only; nothing is retried and duplicates are not
//! filtered.

use crate::network::{DiscoveryQueue, Host, PeerAddress};
use crate::session::{Direction, SessionManager};
use crate::transport::{LatencyProber, ProbeResult};
use crate::utils::Console;
use libp2p::StreamProtocol;
use std::sync::Arc;
use uuid::Uuid;

/// What servicing one discovered peer led to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerOutcome {
    /// A chat session was started
    SessionStarted(Uuid),
    /// The peer could not be connected to
    ConnectFailed,
    /// The chat stream could not be opened
    StreamFailed,
}

/// Services discovered peers
pub struct Orchestrator<H: Host> {
    host: Arc<H>,
    prober: LatencyProber<H>,
    sessions: SessionManager,
    console: Console,
    chat_protocol: StreamProtocol,
}

impl<H: Host> Orchestrator<H> {
    /// Create an orchestrator
    pub fn new(
        host: Arc<H>,
        prober: LatencyProber<H>,
        sessions: SessionManager,
        console: Console,
        chat_protocol: StreamProtocol,
    ) -> Self {
        Self {
            host,
            prober,
            sessions,
            console,
            chat_protocol,
        }
    }

    /// Service peers from `queue` until it closes
    pub async fn run(&self, mut queue: DiscoveryQueue) {
        log::info!("Waiting for peers");

        while let Some(peer) = queue.next().await {
            let outcome = self.service(peer).await;
            log::debug!("Peer serviced: {:?}", outcome);
        }

        log::info!("Discovery queue closed, orchestrator stopping");
    }

    /// Service a single discovered peer
    pub async fn service(&self, peer: PeerAddress) -> PeerOutcome {
        let peer_id = peer.peer_id;
        self.console
            .notice(format!("Found peer: {peer}: connecting..."));

        if let Err(e) = self.host.connect(&peer).await {
            log::warn!("Connection to {} failed: {}", peer_id, e);
            self.console.notice(format!("Connection failed: {e}"));
            return PeerOutcome::ConnectFailed;
        }

        match self.prober.probe(peer_id).await {
            ProbeResult::Success { rtt } => {
                self.console.notice(format!("Pinged {peer_id} in {rtt:?}"));
            }
            ProbeResult::Failed(failure) => {
                log::warn!("Ping to {} failed: {}", peer_id, failure);
                self.console
                    .notice(format!("Ping to {peer_id} failed: {failure}"));
            }
        }

        let stream = match self
            .host
            .open_stream(peer_id, self.chat_protocol.clone())
            .await
        {
            Ok(stream) => stream,
            Err(e) => {
                log::warn!("Opening chat stream to {} failed: {}", peer_id, e);
                self.console.notice(format!("Connection failed: {e}"));
                return PeerOutcome::StreamFailed;
            }
        };

        let id = self
            .sessions
            .spawn(peer_id, Direction::Outbound, stream)
            .await;
        PeerOutcome::SessionStarted(id)
    }
}
