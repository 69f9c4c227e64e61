//! In-memory networking doubles for unit tests.

use crate::network::{Host, PeerAddress};
use crate::session::SessionManager;
use crate::utils::{ChatError, NetworkError, Result};
use async_trait::async_trait;
use futures::channel::mpsc;
use futures::stream::BoxStream;
use futures::{AsyncRead, AsyncWrite, StreamExt};
use libp2p::{PeerId, StreamProtocol};
use std::collections::{HashMap, HashSet};
use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

/// One end of an in-memory bidirectional byte stream
pub struct Pipe {
    incoming: mpsc::UnboundedReceiver<Vec<u8>>,
    buffered: Vec<u8>,
    outgoing: mpsc::UnboundedSender<Vec<u8>>,
}

/// Create a connected pair of pipe ends
pub fn pipe() -> (Pipe, Pipe) {
    let (a_tx, a_rx) = mpsc::unbounded();
    let (b_tx, b_rx) = mpsc::unbounded();
    (
        Pipe {
            incoming: a_rx,
            buffered: Vec::new(),
            outgoing: b_tx,
        },
        Pipe {
            incoming: b_rx,
            buffered: Vec::new(),
            outgoing: a_tx,
        },
    )
}

impl AsyncRead for Pipe {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut [u8],
    ) -> Poll<io::Result<usize>> {
        while self.buffered.is_empty() {
            match self.incoming.poll_next_unpin(cx) {
                Poll::Ready(Some(chunk)) => self.buffered = chunk,
                Poll::Ready(None) => return Poll::Ready(Ok(0)),
                Poll::Pending => return Poll::Pending,
            }
        }

        let n = buf.len().min(self.buffered.len());
        buf[..n].copy_from_slice(&self.buffered[..n]);
        self.buffered.drain(..n);
        Poll::Ready(Ok(n))
    }
}

impl AsyncWrite for Pipe {
    fn poll_write(self: Pin<&mut Self>, _cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        match self.outgoing.unbounded_send(buf.to_vec()) {
            Ok(()) => Poll::Ready(Ok(buf.len())),
            Err(_) => Poll::Ready(Err(io::ErrorKind::BrokenPipe.into())),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_close(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.outgoing.close_channel();
        Poll::Ready(Ok(()))
    }
}

type Handlers = HashMap<(PeerId, StreamProtocol), mpsc::UnboundedSender<(PeerId, Pipe)>>;

/// Shared "network" that in-memory hosts open streams through
#[derive(Clone, Default)]
pub struct MemoryNetwork {
    handlers: Arc<Mutex<Handlers>>,
}

impl MemoryNetwork {
    /// A new host attached to this network
    pub fn host(&self) -> MemoryHost {
        MemoryHost {
            peer_id: PeerId::random(),
            network: self.clone(),
            connects: Mutex::new(Vec::new()),
            unreachable: Mutex::new(HashSet::new()),
        }
    }
}

/// In-memory [`Host`] recording every connection attempt
pub struct MemoryHost {
    peer_id: PeerId,
    network: MemoryNetwork,
    connects: Mutex<Vec<PeerId>>,
    unreachable: Mutex<HashSet<PeerId>>,
}

impl MemoryHost {
    /// Make every connection attempt to `peer` fail
    pub fn set_unreachable(&self, peer: PeerId) {
        self.unreachable.lock().unwrap().insert(peer);
    }

    /// Peers this host tried to connect to, in order
    pub fn connect_attempts(&self) -> Vec<PeerId> {
        self.connects.lock().unwrap().clone()
    }
}

#[async_trait]
impl Host for MemoryHost {
    type Stream = Pipe;

    fn local_peer_id(&self) -> PeerId {
        self.peer_id
    }

    async fn connect(&self, peer: &PeerAddress) -> Result<()> {
        self.connects.lock().unwrap().push(peer.peer_id);

        if self.unreachable.lock().unwrap().contains(&peer.peer_id) {
            return Err(NetworkError::ConnectionFailed {
                peer: peer.peer_id.to_string(),
                reason: "unreachable".to_string(),
            }
            .into());
        }
        Ok(())
    }

    async fn open_stream(&self, peer: PeerId, protocol: StreamProtocol) -> Result<Pipe> {
        let handlers = self.network.handlers.lock().unwrap();
        let handler = handlers
            .get(&(peer, protocol.clone()))
            .ok_or_else(|| NetworkError::StreamOpen {
                peer: peer.to_string(),
                protocol: protocol.to_string(),
                reason: "protocol not supported".to_string(),
            })?;

        let (local, remote) = pipe();
        handler
            .unbounded_send((self.peer_id, remote))
            .map_err(|_| ChatError::from(NetworkError::HostClosed))?;
        Ok(local)
    }

    fn accept(&self, protocol: StreamProtocol) -> Result<BoxStream<'static, (PeerId, Pipe)>> {
        let mut handlers = self.network.handlers.lock().unwrap();
        let key = (self.peer_id, protocol.clone());
        if handlers.contains_key(&key) {
            return Err(NetworkError::AlreadyRegistered {
                protocol: protocol.to_string(),
            }
            .into());
        }

        let (sender, receiver) = mpsc::unbounded();
        handlers.insert(key, sender);
        Ok(receiver.boxed())
    }
}

/// Wait until `sessions` holds exactly `expected` sessions
///
/// Gives up after about two seconds.
pub async fn wait_for_sessions(sessions: &SessionManager, expected: usize) -> bool {
    for _ in 0..200 {
        if sessions.len().await == expected {
            return true;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    false
}
