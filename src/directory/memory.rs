//! In-process directory
//!
//! Keeps the registered descriptors in a map keyed by stream name. Cloning the
//! directory shares the same registry, so a clone handed to the relay can be
//! inspected from the outside.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::stream::StreamDescriptor;

use super::error::DirectoryError;
use super::Directory;

#[derive(Default)]
struct Inner {
    streams: RwLock<HashMap<String, StreamDescriptor>>,
    new_stream_calls: AtomicU32,
    close_stream_calls: AtomicU32,
    reject_new: bool,
}

/// Directory held in memory
#[derive(Clone, Default)]
pub struct MemoryDirectory {
    inner: Arc<Inner>,
}

impl MemoryDirectory {
    /// Create an empty directory
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a directory that refuses every registration
    pub fn rejecting() -> Self {
        Self {
            inner: Arc::new(Inner {
                reject_new: true,
                ..Default::default()
            }),
        }
    }

    /// Look up a registered stream by name
    pub async fn get(&self, name: &str) -> Option<StreamDescriptor> {
        self.inner.streams.read().await.get(name).cloned()
    }

    /// Check whether a stream is registered
    pub async fn is_registered(&self, name: &str) -> bool {
        self.inner.streams.read().await.contains_key(name)
    }

    /// Number of registered streams
    pub async fn stream_count(&self) -> usize {
        self.inner.streams.read().await.len()
    }

    /// Number of `new_stream` calls received, successful or not
    pub fn new_stream_calls(&self) -> u32 {
        self.inner.new_stream_calls.load(Ordering::Relaxed)
    }

    /// Number of `close_stream` calls received, successful or not
    pub fn close_stream_calls(&self) -> u32 {
        self.inner.close_stream_calls.load(Ordering::Relaxed)
    }
}

impl Directory for MemoryDirectory {
    async fn new_stream(&self, stream: &StreamDescriptor) -> Result<(), DirectoryError> {
        self.inner.new_stream_calls.fetch_add(1, Ordering::Relaxed);

        if self.inner.reject_new {
            return Err(DirectoryError::Rejected("registrations disabled".into()));
        }

        let mut streams = self.inner.streams.write().await;
        if streams.contains_key(&stream.name) {
            return Err(DirectoryError::StreamAlreadyRegistered(stream.name.clone()));
        }
        streams.insert(stream.name.clone(), stream.clone());

        tracing::info!(stream = %stream, streams = streams.len(), "Stream registered");
        Ok(())
    }

    async fn close_stream(&self, stream: &StreamDescriptor) -> Result<(), DirectoryError> {
        self.inner.close_stream_calls.fetch_add(1, Ordering::Relaxed);

        let mut streams = self.inner.streams.write().await;
        if streams.remove(&stream.name).is_none() {
            return Err(DirectoryError::StreamNotFound(stream.name.clone()));
        }

        tracing::info!(stream = %stream, streams = streams.len(), "Stream removed");
        Ok(())
    }
}
