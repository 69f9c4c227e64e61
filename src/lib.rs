//! # mDNS Chat
//!
//! A peer-to-peer chat node for the local network. Nodes find each other
//! with mDNS, measure round-trip latency with a small echo protocol and then
//! exchange newline-delimited text over a dedicated chat stream.
//!
//! ## Features
//!
//! - **Zero configuration**: peers on the same link are discovered via mDNS
//! - **Latency probing**: every discovered peer is pinged before chatting
//! - **Full-duplex sessions**: one read loop and one write loop per stream
//! - **libp2p transport**: TCP with noise encryption and yamux multiplexing
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use mdns_chat::{App, ChatConfig, Console};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ChatConfig::default();
//!     let console = Console::stdio(true);
//!     let app = App::new(config, console)?;
//!     app.run().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! - [`network`]: the libp2p host and the mDNS discovery adapter
//! - [`transport`]: the chat line duplexer and the latency prober
//! - [`session`]: session ownership, the outbound control loop and inbound handlers
//! - [`utils`]: configuration, the operator console and error types

#![warn(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::cargo)]
#![allow(clippy::module_name_repetitions)]

pub mod app;
pub mod network;
pub mod session;
pub mod transport;
pub mod utils;

#[cfg(test)]
mod testing;

// Re-export commonly used types for convenience
pub use app::{App, AppHandle, AppStats};
pub use network::{Host, Libp2pHost, PeerAddress};
pub use session::{InboundAcceptor, Orchestrator, SessionManager};
pub use transport::{LatencyProber, ProbeResult};
pub use utils::{ChatConfig, ChatError, Console, Result};

/// Default configuration values
pub mod defaults {
    /// Listen on every IPv4 interface, on a random TCP port
    pub const LISTEN_ADDRESS: &str = "/ip4/0.0.0.0/tcp/0";

    /// Protocol identifier of the chat stream
    pub const CHAT_PROTOCOL: &str = "/chat/1.0.0";

    /// Protocol identifier of the latency probe
    pub const PING_PROTOCOL: &str = "/ping/1.0.0";

    /// Interval between mDNS queries in seconds
    pub const MDNS_QUERY_INTERVAL: u64 = 5;

    /// Seconds an idle connection is kept open
    pub const IDLE_CONNECTION_TIMEOUT: u64 = 60;
}
