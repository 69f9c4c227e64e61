//! Session layer: chat sessions, the outbound control loop and inbound
//! stream handling.

pub mod acceptor;
pub mod manager;
pub mod orchestrator;

pub use acceptor::InboundAcceptor;
pub use manager::*;
pub use orchestrator::{Orchestrator, PeerOutcome};
