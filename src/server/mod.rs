//! Viewer-facing side of the relay
//!
//! - [`Listener`] accepts viewers without blocking
//! - [`ClientSet`] holds them and fans chunks out
//! - [`Relay`] drives the accept/broadcast cycle and owns every resource

pub mod clients;
pub mod config;
pub mod listener;
pub mod relay;

pub use clients::ClientSet;
pub use config::RelayConfig;
pub use listener::Listener;
pub use relay::{pump, Burst, Relay, RelayState, StopReason};
