//! Directory error types

/// Error type for directory operations
#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    /// The portal address could not be resolved
    #[error("failed to find portal at {addr}: {source}")]
    Lookup {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// Transport failure while talking to the portal
    #[error("portal I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The portal did not answer in time
    #[error("portal request timed out")]
    Timeout,

    /// The portal closed the connection without replying
    #[error("portal closed the connection")]
    ConnectionClosed,

    /// Malformed request or reply
    #[error("portal message error: {0}")]
    Codec(#[from] serde_json::Error),

    /// The portal refused the request
    #[error("portal rejected request: {0}")]
    Rejected(String),

    /// A stream with this name is already registered
    #[error("stream already registered: {0}")]
    StreamAlreadyRegistered(String),

    /// No stream with this name is registered
    #[error("stream not found: {0}")]
    StreamNotFound(String),
}
