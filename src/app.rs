//! Node lifecycle and component wiring.
//!
//! [`App`] builds the libp2p host from configuration, registers the inbound
//! handlers, starts the swarm event loop and finally hands control to the
//! orchestrator, which runs for the rest of the process lifetime.

use crate::{
    network::{DiscoveryAdapter, Host, Libp2pHost, SwarmDriver},
    session::{InboundAcceptor, Orchestrator, SessionManager},
    transport::LatencyProber,
    utils::{ChatConfig, Console, Result},
};
use libp2p::{identity::Keypair, Multiaddr, PeerId};
use std::sync::Arc;

/// A chat node
pub struct App {
    /// Node configuration
    config: ChatConfig,
    /// Operator console
    console: Console,
    /// Handle to the libp2p host
    host: Arc<Libp2pHost>,
    /// Swarm event loop, started by [`App::run`]
    driver: SwarmDriver,
    /// Live chat sessions
    sessions: SessionManager,
}

/// Snapshot of a running node
#[derive(Debug, Clone)]
pub struct AppStats {
    /// Identity of the node
    pub peer_id: PeerId,
    /// Addresses the node listens on
    pub listen_addrs: Vec<Multiaddr>,
    /// Number of live chat sessions
    pub active_sessions: usize,
}

impl App {
    /// Create a node with a fresh identity
    ///
    /// # Errors
    ///
    /// Fails if the configuration is invalid or the host cannot be set up.
    pub fn new(config: ChatConfig, console: Console) -> Result<Self> {
        config.validate()?;

        let keypair = Keypair::generate_ed25519();
        let (host, driver) = Libp2pHost::new(keypair, &config, console.clone())?;
        let sessions = SessionManager::new(console.clone());

        Ok(Self {
            config,
            console,
            host: Arc::new(host),
            driver,
            sessions,
        })
    }

    /// Identity of this node
    pub fn local_peer_id(&self) -> PeerId {
        self.host.local_peer_id()
    }

    /// Handle to the running node, usable after [`App::run`] took `self`
    pub fn handle(&self) -> AppHandle {
        AppHandle {
            host: self.host.clone(),
            sessions: self.sessions.clone(),
        }
    }

    /// Run the node
    ///
    /// Returns only if the inbound handlers cannot be registered or the
    /// swarm event loop stops.
    pub async fn run(self) -> Result<()> {
        let Self {
            config,
            console,
            host,
            driver,
            sessions,
        } = self;

        log::info!("Starting chat node {}", host.local_peer_id());
        console.notice(format!("Peer ID: {}", host.local_peer_id()));

        let chat = config.protocol.chat()?;
        let ping = config.protocol.ping()?;

        InboundAcceptor::new(host.clone(), sessions.clone(), console.clone())
            .register(ping.clone(), chat.clone())?;

        let (adapter, queue) = DiscoveryAdapter::channel();
        tokio::spawn(driver.run(adapter));

        let prober = LatencyProber::new(host.clone(), ping, config.protocol.probe_timeout());
        Orchestrator::new(host, prober, sessions, console, chat)
            .run(queue)
            .await;

        log::info!("Chat node stopped");
        Ok(())
    }

    /// Current node statistics
    pub async fn stats(&self) -> AppStats {
        self.handle().stats().await
    }
}

/// Cloneable view of a node, valid while [`App::run`] is in progress
#[derive(Clone)]
pub struct AppHandle {
    host: Arc<Libp2pHost>,
    sessions: SessionManager,
}

impl AppHandle {
    /// Current node statistics
    ///
    /// Listen addresses appear once the swarm has reported them.
    pub async fn stats(&self) -> AppStats {
        AppStats {
            peer_id: self.host.local_peer_id(),
            listen_addrs: self.host.listen_addrs().await,
            active_sessions: self.sessions.len().await,
        }
    }

    /// Shut every chat session down
    pub async fn shutdown(&self) {
        self.sessions.shutdown_all().await;
    }
}
