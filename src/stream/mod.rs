//! Stream identity
//!
//! The descriptor announced to the directory service.

pub mod descriptor;

pub use descriptor::StreamDescriptor;
