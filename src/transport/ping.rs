//! Latency probing.
//!
//! A probe writes a random payload on a dedicated protocol stream and waits
//! for the peer to echo it back. The responder echoes payloads until the
//! stream ends, so one stream can carry any number of probes.

use crate::network::Host;
use futures::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use libp2p::{PeerId, StreamProtocol};
use rand::RngCore;
use std::fmt;
use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Size of a probe payload in bytes
pub const PING_SIZE: usize = 32;

/// Outcome of one latency probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeResult {
    /// The peer echoed the payload
    Success {
        /// Round-trip time
        rtt: Duration,
    },
    /// The probe did not complete
    Failed(ProbeFailure),
}

/// Why a probe failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeFailure {
    /// The probe stream could not be opened
    StreamOpen(String),
    /// Reading or writing the probe stream failed
    Io(String),
    /// The echoed payload differs from the one sent
    Mismatch,
    /// No echo within the configured timeout
    Timeout(Duration),
}

impl ProbeResult {
    /// Round-trip time, if the probe succeeded
    pub fn rtt(&self) -> Option<Duration> {
        match self {
            Self::Success { rtt } => Some(*rtt),
            Self::Failed(_) => None,
        }
    }

    /// Whether the probe succeeded
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

impl fmt::Display for ProbeFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StreamOpen(reason) => write!(f, "could not open probe stream: {reason}"),
            Self::Io(reason) => write!(f, "probe I/O failed: {reason}"),
            Self::Mismatch => write!(f, "echoed payload does not match"),
            Self::Timeout(after) => write!(f, "no response within {after:?}"),
        }
    }
}

/// Measures round-trip latency to peers
pub struct LatencyProber<H> {
    host: Arc<H>,
    protocol: StreamProtocol,
    timeout: Option<Duration>,
}

impl<H: Host> LatencyProber<H> {
    /// Create a prober using `protocol`
    ///
    /// Without a timeout a probe waits for as long as the transport keeps the
    /// stream open.
    pub fn new(host: Arc<H>, protocol: StreamProtocol, timeout: Option<Duration>) -> Self {
        Self {
            host,
            protocol,
            timeout,
        }
    }

    /// Probe `peer` once
    ///
    /// Only the calling task waits; failures are reported in the result.
    pub async fn probe(&self, peer: PeerId) -> ProbeResult {
        let attempt = self.probe_once(peer);

        match self.timeout {
            Some(limit) => tokio::time::timeout(limit, attempt)
                .await
                .unwrap_or(ProbeResult::Failed(ProbeFailure::Timeout(limit))),
            None => attempt.await,
        }
    }

    async fn probe_once(&self, peer: PeerId) -> ProbeResult {
        let mut stream = match self.host.open_stream(peer, self.protocol.clone()).await {
            Ok(stream) => stream,
            Err(e) => return ProbeResult::Failed(ProbeFailure::StreamOpen(e.to_string())),
        };

        let result = send_ping(&mut stream).await;
        let _ = stream.close().await;
        result
    }
}

/// Send one payload and wait for its echo
pub async fn send_ping<S>(stream: &mut S) -> ProbeResult
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut payload = [0u8; PING_SIZE];
    rand::thread_rng().fill_bytes(&mut payload);

    let started = Instant::now();
    match exchange(stream, &payload).await {
        Ok(()) => ProbeResult::Success {
            rtt: started.elapsed(),
        },
        Err(failure) => ProbeResult::Failed(failure),
    }
}

async fn exchange<S>(stream: &mut S, payload: &[u8; PING_SIZE]) -> Result<(), ProbeFailure>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let io_failed = |e: io::Error| ProbeFailure::Io(e.to_string());

    stream.write_all(payload).await.map_err(io_failed)?;
    stream.flush().await.map_err(io_failed)?;

    let mut echo = [0u8; PING_SIZE];
    stream.read_exact(&mut echo).await.map_err(io_failed)?;

    if &echo != payload {
        return Err(ProbeFailure::Mismatch);
    }
    Ok(())
}

/// Echo probe payloads until the stream ends
///
/// A clean end of stream between payloads is not an error.
pub async fn serve_pings<S>(mut stream: S) -> io::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut payload = [0u8; PING_SIZE];

    loop {
        match stream.read_exact(&mut payload).await {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(()),
            Err(e) => return Err(e),
        }

        stream.write_all(&payload).await?;
        stream.flush().await?;
    }
}
