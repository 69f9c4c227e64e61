//! Handlers for streams opened by remote peers.

use crate::network::Host;
use crate::session::{Direction, SessionManager};
use crate::transport::serve_pings;
use crate::utils::{Console, Result};
use futures::stream::BoxStream;
use futures::{AsyncRead, AsyncWrite, StreamExt};
use libp2p::{PeerId, StreamProtocol};
use std::sync::Arc;

/// Registers the ping and chat protocol handlers
pub struct InboundAcceptor<H> {
    host: Arc<H>,
    sessions: SessionManager,
    console: Console,
}

impl<H: Host> InboundAcceptor<H> {
    /// Create an acceptor handing chat streams to `sessions`
    pub fn new(host: Arc<H>, sessions: SessionManager, console: Console) -> Self {
        Self {
            host,
            sessions,
            console,
        }
    }

    /// Register both handlers and start serving inbound streams
    ///
    /// Must run before discovered peers are serviced, so that peers dialing
    /// this node are answered from the start.
    pub fn register(&self, ping: StreamProtocol, chat: StreamProtocol) -> Result<()> {
        let pings = self.host.accept(ping.clone())?;
        let chats = self.host.accept(chat.clone())?;
        log::info!("Accepting {} and {} streams", ping, chat);

        tokio::spawn(answer_pings(pings));
        tokio::spawn(accept_chats(
            chats,
            self.sessions.clone(),
            self.console.clone(),
        ));
        Ok(())
    }
}

async fn answer_pings<S>(mut incoming: BoxStream<'static, (PeerId, S)>)
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    while let Some((peer, stream)) = incoming.next().await {
        tokio::spawn(async move {
            if let Err(e) = serve_pings(stream).await {
                log::debug!("Ping stream from {} failed: {}", peer, e);
            }
        });
    }
}

async fn accept_chats<S>(
    mut incoming: BoxStream<'static, (PeerId, S)>,
    sessions: SessionManager,
    console: Console,
) where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    while let Some((peer, stream)) = incoming.next().await {
        console.notice(format!("Got a new stream from {peer}!"));
        sessions.spawn(peer, Direction::Inbound, stream).await;
    }
}
