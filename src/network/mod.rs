//! Network layer: the host abstraction and peer discovery.

pub mod discovery;
pub mod host;

pub use discovery::*;
pub use host::{Host, Libp2pHost, SwarmDriver};
