//! Remote portal client
//!
//! Each call opens a short-lived TCP connection to the portal and exchanges
//! exactly one line of JSON in each direction:
//!
//! ```text
//! -> {"method":"NewStream","stream":{"name":"news","endpoint":"tcp://host:9600",...}}
//! <- {"ok":true}
//! <- {"ok":false,"error":"stream already exists"}
//! ```

use std::net::SocketAddr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

use crate::stream::StreamDescriptor;

use super::error::DirectoryError;
use super::Directory;

/// Default port of the portal service
pub const DEFAULT_PORTAL_ADDR: &str = "localhost:9500";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
enum Method {
    NewStream,
    CloseStream,
}

#[derive(Debug, Serialize)]
struct Request<'a> {
    method: Method,
    stream: &'a StreamDescriptor,
}

#[derive(Debug, Deserialize)]
struct Reply {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
}

/// Client for a remote portal
#[derive(Debug, Clone)]
pub struct PortalClient {
    addr: SocketAddr,
    timeout: Duration,
}

impl PortalClient {
    /// Create a client for an already resolved address
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            timeout: Duration::from_secs(5),
        }
    }

    /// Resolve a `host:port` portal address
    pub async fn lookup(addr: &str) -> Result<Self, DirectoryError> {
        let resolved = tokio::net::lookup_host(addr)
            .await
            .map_err(|source| DirectoryError::Lookup {
                addr: addr.to_string(),
                source,
            })?
            .next()
            .ok_or_else(|| DirectoryError::Lookup {
                addr: addr.to_string(),
                source: std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "no addresses resolved",
                ),
            })?;

        tracing::debug!(portal = %resolved, "Portal resolved");
        Ok(Self::new(resolved))
    }

    /// Set the per-request timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Portal address
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    async fn call(&self, method: Method, stream: &StreamDescriptor) -> Result<(), DirectoryError> {
        tokio::time::timeout(self.timeout, self.exchange(method, stream))
            .await
            .map_err(|_| DirectoryError::Timeout)?
    }

    async fn exchange(&self, method: Method, stream: &StreamDescriptor) -> Result<(), DirectoryError> {
        let mut payload = serde_json::to_vec(&Request { method, stream })?;
        payload.push(b'\n');

        let mut socket = TcpStream::connect(self.addr).await?;
        socket.write_all(&payload).await?;

        let mut line = String::new();
        let n = BufReader::new(&mut socket).read_line(&mut line).await?;
        if n == 0 {
            return Err(DirectoryError::ConnectionClosed);
        }

        let reply: Reply = serde_json::from_str(line.trim_end())?;
        if reply.ok {
            Ok(())
        } else {
            Err(DirectoryError::Rejected(reply.error.unwrap_or_default()))
        }
    }
}

impl Directory for PortalClient {
    async fn new_stream(&self, stream: &StreamDescriptor) -> Result<(), DirectoryError> {
        self.call(Method::NewStream, stream).await
    }

    async fn close_stream(&self, stream: &StreamDescriptor) -> Result<(), DirectoryError> {
        self.call(Method::CloseStream, stream).await
    }
}
