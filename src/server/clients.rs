//! Connected viewers
//!
//! Viewers are pure receivers of a live feed. A viewer that cannot take a
//! whole chunk right away is dropped on the spot so it never holds back the
//! others.

use std::io::Write;
use std::net::{SocketAddr, TcpStream};

/// A single connected viewer
pub struct Client<W> {
    id: u64,
    peer: Option<SocketAddr>,
    stream: W,
    bytes_sent: u64,
}

impl<W> Client<W> {
    /// Viewer id, unique within its set
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Remote address, if known
    pub fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }

    /// Bytes delivered to this viewer so far
    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent
    }
}

/// The set of connected viewers
pub struct ClientSet<W = TcpStream> {
    clients: Vec<Client<W>>,
    next_id: u64,
}

impl<W: Write> ClientSet<W> {
    /// Create an empty set
    pub fn new() -> Self {
        Self {
            clients: Vec::new(),
            next_id: 1,
        }
    }

    /// Add a viewer, returning its id
    pub fn add(&mut self, stream: W, peer: Option<SocketAddr>) -> u64 {
        let id = self.next_id;
        self.next_id += 1;

        self.clients.push(Client {
            id,
            peer,
            stream,
            bytes_sent: 0,
        });
        id
    }

    /// Number of connected viewers
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    /// Whether no viewer is connected
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// Whether the viewer with this id is still connected
    pub fn contains(&self, id: u64) -> bool {
        self.clients.iter().any(|c| c.id == id)
    }

    /// Iterate over the connected viewers
    pub fn iter(&self) -> impl Iterator<Item = &Client<W>> {
        self.clients.iter()
    }

    /// Write `chunk` to every viewer, dropping the ones that fail
    ///
    /// A write that errors, would block, or accepts only part of the chunk
    /// removes the viewer and closes its socket in this same pass. Returns
    /// the number of viewers removed.
    pub fn broadcast_and_prune(&mut self, chunk: &[u8]) -> usize {
        let before = self.clients.len();

        self.clients.retain_mut(|client| match client.stream.write(chunk) {
            Ok(n) if n == chunk.len() => {
                client.bytes_sent += n as u64;
                true
            }
            Ok(n) => {
                tracing::info!(
                    client = client.id,
                    written = n,
                    expected = chunk.len(),
                    "Short write, removing client"
                );
                false
            }
            Err(e) => {
                tracing::info!(client = client.id, error = %e, "Write failed, removing client");
                false
            }
        });

        before - self.clients.len()
    }

    /// Close and remove every viewer, returning how many were connected
    pub fn clear(&mut self) -> usize {
        let count = self.clients.len();
        self.clients.clear();
        count
    }
}

impl<W: Write> Default for ClientSet<W> {
    fn default() -> Self {
        Self::new()
    }
}
