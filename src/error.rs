//! Error types for the cache engine

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the cache engine.
///
/// Variants are cloneable so that every waiter coalesced onto a single
/// in-flight load can receive the leader's failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Caller passed an empty or malformed argument
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The source loader reports the key as absent
    #[error("key not found: {0}")]
    NotFound(String),

    /// Every candidate peer failed, or the race deadline expired
    #[error("peers unavailable: {0}")]
    Unavailable(String),

    /// Peer I/O failure, unexpected HTTP status, or response decode failure
    #[error("transport error from {peer}: {reason}")]
    Transport { peer: String, reason: String },

    /// Wire message could not be decoded
    #[error("failed to decode wire message: {0}")]
    Decode(String),

    /// Request named a group this node does not serve
    #[error("no such group: {0}")]
    GroupNotFound(String),

    // =========================================================================
    // Collaborator Errors
    // =========================================================================
    /// Storage engine error
    #[error("storage error: {0}")]
    Storage(String),

    /// Compression failed
    #[error("compression with {algorithm} failed: {reason}")]
    CompressionFailed { algorithm: String, reason: String },

    /// Decompression failed
    #[error("decompression with {algorithm} failed: {reason}")]
    DecompressionFailed { algorithm: String, reason: String },

    /// Service registration / discovery error
    #[error("registry error: {0}")]
    Registry(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(String),

    /// Internal error
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}

impl Error {
    /// Whether the read pipeline may recover from this failure by falling
    /// through to the source loader.
    pub fn is_peer_failure(&self) -> bool {
        matches!(
            self,
            Error::Unavailable(_) | Error::Transport { .. } | Error::Decode(_)
        )
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_peer_failures_are_recoverable() {
        let transport = Error::Transport {
            peer: "http://127.0.0.1:8002".to_string(),
            reason: "connection refused".to_string(),
        };
        assert!(transport.is_peer_failure());
        assert!(Error::Unavailable("race timed out".to_string()).is_peer_failure());
        assert!(!Error::NotFound("Tom".to_string()).is_peer_failure());
        assert!(!Error::InvalidArgument("key is required".to_string()).is_peer_failure());
    }

    #[test]
    fn test_error_display() {
        let err = Error::GroupNotFound("scores".to_string());
        assert_eq!(err.to_string(), "no such group: scores");
    }
}
