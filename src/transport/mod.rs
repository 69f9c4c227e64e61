//! Wire protocols spoken over peer streams.
//!
//! - [`duplex`]: newline-delimited chat lines
//! - [`ping`]: payload echo used for latency probes

pub mod duplex;
pub mod ping;

pub use duplex::{read_loop, write_loop};
pub use ping::{serve_pings, LatencyProber, ProbeFailure, ProbeResult};
