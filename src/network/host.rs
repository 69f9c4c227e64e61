//! Host abstraction and its libp2p implementation.
//!
//! The [`Host`] trait is the process-wide networking context every component
//! receives at construction: local identity, dialing, and protocol-negotiated
//! stream open/accept. [`Libp2pHost`] implements it over a TCP/noise/yamux
//! swarm whose event loop runs in a separate [`SwarmDriver`] task.

use crate::network::discovery::{group_discovered, PeerAddress, PeerFound};
use crate::utils::{ChatConfig, ChatError, Console, NetworkError, Result};
use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::{AsyncRead, AsyncWrite, StreamExt};
use behaviour::{ChatBehaviour, ChatBehaviourEvent};
use libp2p::{
    identity::Keypair,
    mdns, noise,
    swarm::{behaviour::toggle::Toggle, dial_opts::DialOpts, SwarmEvent},
    tcp, yamux, Multiaddr, PeerId, Stream, StreamProtocol, Swarm,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, RwLock};

/// Networking capabilities the chat components depend on
#[async_trait]
pub trait Host: Send + Sync + 'static {
    /// Bidirectional byte stream negotiated for one protocol
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    /// Identity of this node
    fn local_peer_id(&self) -> PeerId;

    /// Establish a connection to a peer using its announced addresses
    ///
    /// Succeeds immediately if a connection already exists.
    async fn connect(&self, peer: &PeerAddress) -> Result<()>;

    /// Open an outbound stream to a peer under the given protocol
    async fn open_stream(&self, peer: PeerId, protocol: StreamProtocol) -> Result<Self::Stream>;

    /// Register a handler for inbound streams of the given protocol
    ///
    /// Each protocol can only be registered once.
    fn accept(&self, protocol: StreamProtocol)
        -> Result<BoxStream<'static, (PeerId, Self::Stream)>>;
}

// The derive expands to plain `Result<_, _>`, which must not resolve to the
// crate alias.
mod behaviour {
    use libp2p::{
        mdns,
        swarm::{behaviour::toggle::Toggle, NetworkBehaviour},
    };

    #[derive(NetworkBehaviour)]
    pub struct ChatBehaviour {
        pub mdns: Toggle<mdns::tokio::Behaviour>,
        pub stream: libp2p_stream::Behaviour,
    }
}

/// Requests from host handles to the swarm driver
#[derive(Debug)]
enum Command {
    Dial {
        peer: PeerAddress,
        reply: oneshot::Sender<Result<()>>,
    },
}

/// Host backed by a libp2p swarm
#[derive(Clone)]
pub struct Libp2pHost {
    local_peer_id: PeerId,
    control: libp2p_stream::Control,
    commands: mpsc::UnboundedSender<Command>,
    listen_addrs: Arc<RwLock<Vec<Multiaddr>>>,
}

/// Owns the swarm and drives its event loop
pub struct SwarmDriver {
    swarm: Swarm<ChatBehaviour>,
    commands: mpsc::UnboundedReceiver<Command>,
    pending_dials: HashMap<PeerId, Vec<oneshot::Sender<Result<()>>>>,
    listen_addrs: Arc<RwLock<Vec<Multiaddr>>>,
    console: Console,
}

impl Libp2pHost {
    /// Build the swarm, start listening and start mDNS
    ///
    /// # Errors
    ///
    /// Fails if the transport, the discovery service or any listener cannot
    /// be set up. These failures are fatal for the node.
    pub fn new(keypair: Keypair, config: &ChatConfig, console: Console) -> Result<(Self, SwarmDriver)> {
        let local_peer_id = keypair.public().to_peer_id();
        let enable_mdns = config.network.enable_mdns;
        let mdns_config = mdns::Config {
            query_interval: config.network.mdns_query_interval(),
            ..Default::default()
        };
        let idle_timeout = config.network.idle_connection_timeout();

        let mut swarm = libp2p::SwarmBuilder::with_existing_identity(keypair)
            .with_tokio()
            .with_tcp(
                tcp::Config::default(),
                noise::Config::new,
                yamux::Config::default,
            )
            .map_err(|e| NetworkError::Transport {
                reason: e.to_string(),
            })?
            .with_behaviour(|key| {
                let mdns = if enable_mdns {
                    Some(mdns::tokio::Behaviour::new(
                        mdns_config,
                        key.public().to_peer_id(),
                    )?)
                } else {
                    None
                };

                Ok::<_, Box<dyn std::error::Error + Send + Sync>>(ChatBehaviour {
                    mdns: Toggle::from(mdns),
                    stream: libp2p_stream::Behaviour::new(),
                })
            })
            .map_err(|e| NetworkError::Discovery {
                reason: e.to_string(),
            })?
            .with_swarm_config(|c| c.with_idle_connection_timeout(idle_timeout))
            .build();

        for addr in config.network.listen_multiaddrs()? {
            swarm.listen_on(addr)?;
        }

        let control = swarm.behaviour().stream.new_control();
        let (command_sender, command_receiver) = mpsc::unbounded_channel();
        let listen_addrs = Arc::new(RwLock::new(Vec::new()));

        let host = Self {
            local_peer_id,
            control,
            commands: command_sender,
            listen_addrs: listen_addrs.clone(),
        };
        let driver = SwarmDriver {
            swarm,
            commands: command_receiver,
            pending_dials: HashMap::new(),
            listen_addrs,
            console,
        };

        Ok((host, driver))
    }

    /// Addresses the swarm is currently listening on
    ///
    /// Empty until the swarm driver has reported its first listener.
    pub async fn listen_addrs(&self) -> Vec<Multiaddr> {
        self.listen_addrs.read().await.clone()
    }
}

#[async_trait]
impl Host for Libp2pHost {
    type Stream = Stream;

    fn local_peer_id(&self) -> PeerId {
        self.local_peer_id
    }

    async fn connect(&self, peer: &PeerAddress) -> Result<()> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(Command::Dial {
                peer: peer.clone(),
                reply,
            })
            .map_err(|_| NetworkError::HostClosed)?;
        response.await.map_err(|_| NetworkError::HostClosed)?
    }

    async fn open_stream(&self, peer: PeerId, protocol: StreamProtocol) -> Result<Stream> {
        let mut control = self.control.clone();
        control
            .open_stream(peer, protocol.clone())
            .await
            .map_err(|e| {
                NetworkError::StreamOpen {
                    peer: peer.to_string(),
                    protocol: protocol.to_string(),
                    reason: e.to_string(),
                }
                .into()
            })
    }

    fn accept(&self, protocol: StreamProtocol) -> Result<BoxStream<'static, (PeerId, Stream)>> {
        let mut control = self.control.clone();
        let incoming = control
            .accept(protocol.clone())
            .map_err(|_| NetworkError::AlreadyRegistered {
                protocol: protocol.to_string(),
            })?;
        Ok(incoming.boxed())
    }
}

impl SwarmDriver {
    /// Run the event loop until every host handle is dropped
    ///
    /// Discovered peers are reported to `notifee`.
    pub async fn run<N: PeerFound>(mut self, notifee: N) {
        log::info!("Starting swarm event loop");

        loop {
            tokio::select! {
                event = self.swarm.select_next_some() => self.handle_swarm_event(event, &notifee).await,
                command = self.commands.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => {
                        log::debug!("All host handles dropped, stopping swarm event loop");
                        break;
                    }
                },
            }
        }
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Dial { peer, reply } => self.dial(peer, reply),
        }
    }

    fn dial(&mut self, peer: PeerAddress, reply: oneshot::Sender<Result<()>>) {
        let peer_id = peer.peer_id;

        if self.swarm.is_connected(&peer_id) {
            let _ = reply.send(Ok(()));
            return;
        }

        if let Some(waiting) = self.pending_dials.get_mut(&peer_id) {
            waiting.push(reply);
            return;
        }

        let opts = DialOpts::peer_id(peer_id).addresses(peer.addresses).build();
        match self.swarm.dial(opts) {
            Ok(()) => {
                log::debug!("Dialing {}", peer_id);
                self.pending_dials.insert(peer_id, vec![reply]);
            }
            Err(e) => {
                let _ = reply.send(Err(NetworkError::ConnectionFailed {
                    peer: peer_id.to_string(),
                    reason: e.to_string(),
                }
                .into()));
            }
        }
    }

    fn resolve_dials(&mut self, peer_id: &PeerId, outcome: Result<()>) {
        for reply in self.pending_dials.remove(peer_id).unwrap_or_default() {
            let _ = reply.send(outcome.clone());
        }
    }

    async fn handle_swarm_event<N: PeerFound>(
        &mut self,
        event: SwarmEvent<ChatBehaviourEvent>,
        notifee: &N,
    ) {
        match event {
            SwarmEvent::NewListenAddr { address, .. } => {
                let local_peer_id = *self.swarm.local_peer_id();
                log::info!("Listening on {}", address);
                self.listen_addrs.write().await.push(address.clone());
                self.console
                    .notice(format!("Listening on {address} (ID: {local_peer_id})"));
            }
            SwarmEvent::ExpiredListenAddr { address, .. } => {
                log::info!("No longer listening on {}", address);
                self.listen_addrs.write().await.retain(|addr| *addr != address);
            }
            SwarmEvent::ConnectionEstablished {
                peer_id,
                endpoint,
                num_established,
                ..
            } => {
                log::info!(
                    "Connection established with {} at {} ({} total)",
                    peer_id,
                    endpoint.get_remote_address(),
                    num_established
                );
                self.resolve_dials(&peer_id, Ok(()));
            }
            SwarmEvent::ConnectionClosed { peer_id, cause, .. } => {
                log::debug!("Connection to {} closed: {:?}", peer_id, cause);
            }
            SwarmEvent::OutgoingConnectionError {
                peer_id: Some(peer_id),
                error,
                ..
            } => {
                log::warn!("Outgoing connection to {} failed: {}", peer_id, error);
                let failure: ChatError = NetworkError::ConnectionFailed {
                    peer: peer_id.to_string(),
                    reason: error.to_string(),
                }
                .into();
                self.resolve_dials(&peer_id, Err(failure));
            }
            SwarmEvent::OutgoingConnectionError { peer_id: None, error, .. } => {
                log::warn!("Outgoing connection error (unknown peer): {}", error);
            }
            SwarmEvent::Behaviour(ChatBehaviourEvent::Mdns(mdns::Event::Discovered(records))) => {
                for peer in group_discovered(records) {
                    notifee.peer_found(peer);
                }
            }
            SwarmEvent::Behaviour(ChatBehaviourEvent::Mdns(mdns::Event::Expired(records))) => {
                for (peer_id, addr) in records {
                    log::debug!("mDNS record expired: {} at {}", peer_id, addr);
                }
            }
            _ => {}
        }
    }
}
