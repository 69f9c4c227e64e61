//! Error types and handling for the chat node.
//!
//! Errors are split by the layer that raises them so callers can decide
//! whether a failure ends the process, a single peer's servicing, or a single
//! session.

use thiserror::Error;

/// Result type alias for the chat library
pub type Result<T> = std::result::Result<T, ChatError>;

/// Top-level error type for all chat operations
#[derive(Error, Debug, Clone)]
pub enum ChatError {
    /// Network, host and discovery errors
    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    /// Chat session errors
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Generic I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    /// Generic error for unexpected conditions
    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

/// Network, host and discovery errors
#[derive(Error, Debug, Clone)]
pub enum NetworkError {
    /// Dialing a peer failed on every known address
    #[error("Connection failed to {peer}: {reason}")]
    ConnectionFailed { peer: String, reason: String },

    /// Opening a protocol stream to a peer failed
    #[error("Failed to open {protocol} stream to {peer}: {reason}")]
    StreamOpen {
        peer: String,
        protocol: String,
        reason: String,
    },

    /// Transport stack construction or listening failure
    #[error("Transport error: {reason}")]
    Transport { reason: String },

    /// Discovery service failure
    #[error("Peer discovery failed: {reason}")]
    Discovery { reason: String },

    /// Invalid network address
    #[error("Invalid address: {address}")]
    InvalidAddress { address: String },

    /// Invalid protocol identifier
    #[error("Invalid protocol identifier: {protocol}")]
    InvalidProtocol { protocol: String },

    /// A handler for this protocol is already registered
    #[error("Protocol handler already registered: {protocol}")]
    AlreadyRegistered { protocol: String },

    /// The swarm driver has stopped
    #[error("Host is closed")]
    HostClosed,
}

/// Chat session errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// The remote end closed the stream
    #[error("Stream closed by remote")]
    StreamClosed,

    /// Reading from the stream failed
    #[error("Read failed: {reason}")]
    ReadFailed { reason: String },

    /// Writing or flushing the stream failed
    #[error("Write failed: {reason}")]
    WriteFailed { reason: String },

    /// Operator input is exhausted
    #[error("Operator input closed")]
    InputClosed,

    /// Session not found
    #[error("Session not found: {session_id}")]
    NotFound { session_id: String },
}

/// Configuration errors
#[derive(Error, Debug, Clone)]
pub enum ConfigError {
    /// Invalid configuration value
    #[error("Invalid configuration value for {field}: {value}")]
    InvalidValue { field: String, value: String },

    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: String },

    /// Configuration serialization error
    #[error("Configuration parse error: {reason}")]
    ParseError { reason: String },

    /// TOML parsing error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl ChatError {
    /// Creates a new unexpected error with a custom message
    pub fn unexpected<S: Into<String>>(msg: S) -> Self {
        Self::Unexpected(msg.into())
    }

    /// Returns true if the failure only affects servicing of one peer
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Network(NetworkError::ConnectionFailed { .. })
                | Self::Network(NetworkError::StreamOpen { .. })
                | Self::Session(_)
        )
    }
}

impl From<std::io::Error> for ChatError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<libp2p::swarm::DialError> for ChatError {
    fn from(err: libp2p::swarm::DialError) -> Self {
        Self::Network(NetworkError::ConnectionFailed {
            peer: "unknown".to_string(),
            reason: err.to_string(),
        })
    }
}

impl From<libp2p::TransportError<std::io::Error>> for ChatError {
    fn from(err: libp2p::TransportError<std::io::Error>) -> Self {
        Self::Network(NetworkError::Transport {
            reason: err.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = ChatError::Network(NetworkError::ConnectionFailed {
            peer: "12D3KooW".to_string(),
            reason: "no addresses".to_string(),
        });
        assert!(error.to_string().contains("12D3KooW"));
        assert!(error.to_string().contains("no addresses"));
    }

    #[test]
    fn test_error_recovery() {
        let connect = ChatError::Network(NetworkError::ConnectionFailed {
            peer: "peer".to_string(),
            reason: "refused".to_string(),
        });
        assert!(connect.is_recoverable());

        let stream = ChatError::Network(NetworkError::StreamOpen {
            peer: "peer".to_string(),
            protocol: "/chat/1.0.0".to_string(),
            reason: "unsupported".to_string(),
        });
        assert!(stream.is_recoverable());

        let transport = ChatError::Network(NetworkError::Transport {
            reason: "listen failed".to_string(),
        });
        assert!(!transport.is_recoverable());

        let config = ChatError::Config(ConfigError::InvalidValue {
            field: "logging.level".to_string(),
            value: "loud".to_string(),
        });
        assert!(!config.is_recoverable());
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe gone");
        let error: ChatError = io.into();
        assert!(matches!(error, ChatError::Io(ref msg) if msg.contains("pipe gone")));
    }
}
