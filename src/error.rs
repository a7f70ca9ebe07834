//! Error types

use std::net::SocketAddr;
use std::process::ExitStatus;

use crate::directory::DirectoryError;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the relay
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Generic I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The listen socket could not be set up
    #[error("failed to listen on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// The transcoder executable could not be started
    #[error("failed to spawn transcoder `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The transcoder exited before its output port became connectable
    #[error("transcoder exited early ({0})")]
    TranscoderExited(ExitStatus),

    /// Upstream reached end of stream before a full chunk was read
    #[error("upstream closed after {received} of {expected} bytes")]
    UpstreamClosed { received: usize, expected: usize },

    /// The operation was interrupted by the stop signal
    #[error("cancelled")]
    Cancelled,

    /// Directory service failure
    #[error(transparent)]
    Directory(#[from] DirectoryError),

    /// Invalid configuration value
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl Error {
    /// Whether this error is the stop signal rather than a failure
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }

    /// Whether upstream ended cleanly on a chunk boundary
    pub fn is_end_of_stream(&self) -> bool {
        matches!(self, Error::UpstreamClosed { received: 0, .. })
    }
}
