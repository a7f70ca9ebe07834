//! Live video relay
//!
//! Launches an external transcoder, connects to its TCP output and fans the
//! raw byte stream out to every connected viewer, while announcing the stream
//! to a directory service so clients can find it.
//!
//! ```text
//!  transcoder ──TCP──► Upstream ──chunk──► ClientSet ──► viewer
//!   (child)                                   │──────► viewer
//!                                             └──────► viewer
//! ```
//!
//! The relay loop is single-task: it alternates between accepting pending
//! viewers and broadcasting upstream chunks for a bounded tick budget.

pub mod directory;
pub mod error;
pub mod server;
pub mod stats;
pub mod stream;
pub mod transcoder;
pub mod upstream;

pub use directory::{Directory, DirectoryError, MemoryDirectory, PortalClient};
pub use error::{Error, Result};
pub use server::{ClientSet, Listener, Relay, RelayConfig, RelayState, StopReason};
pub use stats::RelayStats;
pub use stream::StreamDescriptor;
pub use transcoder::Transcoder;
pub use upstream::Upstream;
