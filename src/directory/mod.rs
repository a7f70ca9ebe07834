//! Directory service registration
//!
//! The directory ("portal") tracks the active streams so clients can discover
//! them. The relay announces its [`StreamDescriptor`] once at startup and
//! withdraws it once at shutdown.
//!
//! Two implementations are provided:
//!
//! - [`PortalClient`] talks to a remote portal over TCP, one newline-delimited
//!   JSON request per call.
//! - [`MemoryDirectory`] keeps the registry in-process.

pub mod client;
pub mod error;
pub mod memory;

pub use client::PortalClient;
pub use error::DirectoryError;
pub use memory::MemoryDirectory;

use crate::stream::StreamDescriptor;

/// A registry of active streams
#[allow(async_fn_in_trait)]
pub trait Directory {
    /// Announce a new stream
    async fn new_stream(&self, stream: &StreamDescriptor) -> Result<(), DirectoryError>;

    /// Withdraw a previously announced stream
    async fn close_stream(&self, stream: &StreamDescriptor) -> Result<(), DirectoryError>;
}
