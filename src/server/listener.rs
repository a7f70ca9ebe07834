//! Viewer listener
//!
//! Owns the listen socket. Accepting never suspends the relay loop: when no
//! viewer is pending, [`Listener::try_accept`] returns `None` immediately.

use std::net::SocketAddr;
use std::task::Poll;

use tokio::net::{TcpListener, TcpSocket, TcpStream};

use crate::error::{Error, Result};

/// Non-blocking viewer listener
pub struct Listener {
    inner: TcpListener,
    local_addr: SocketAddr,
    tcp_nodelay: bool,
}

impl Listener {
    /// Bind and listen on `addr`
    pub fn bind(addr: SocketAddr, backlog: u32) -> Result<Self> {
        let bind_err = |source| Error::Bind { addr, source };

        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()
        } else {
            TcpSocket::new_v6()
        }
        .map_err(bind_err)?;

        socket.set_reuseaddr(true).map_err(bind_err)?;
        socket.bind(addr).map_err(bind_err)?;
        let inner = socket.listen(backlog).map_err(bind_err)?;
        let local_addr = inner.local_addr()?;

        tracing::info!(addr = %local_addr, backlog = backlog, "Listening for viewers");

        Ok(Self {
            inner,
            local_addr,
            tcp_nodelay: true,
        })
    }

    /// Enable or disable TCP_NODELAY on accepted sockets
    pub fn nodelay(mut self, enabled: bool) -> Self {
        self.tcp_nodelay = enabled;
        self
    }

    /// Address actually bound
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accept one pending viewer, if any
    ///
    /// The returned socket is in non-blocking mode so a stalled viewer can
    /// never block a broadcast. Accept failures are logged and reported as
    /// "nothing pending".
    pub async fn try_accept(&self) -> Option<(std::net::TcpStream, SocketAddr)> {
        let accepted = std::future::poll_fn(|cx| match self.inner.poll_accept(cx) {
            Poll::Ready(result) => Poll::Ready(Some(result)),
            Poll::Pending => Poll::Ready(None),
        })
        .await?;

        match accepted {
            Ok((stream, peer)) => match self.configure(stream) {
                Ok(stream) => Some((stream, peer)),
                Err(e) => {
                    tracing::warn!(peer = %peer, error = %e, "Failed to configure viewer socket");
                    None
                }
            },
            Err(e) => {
                tracing::warn!(error = %e, "Failed to accept viewer");
                None
            }
        }
    }

    fn configure(&self, stream: TcpStream) -> std::io::Result<std::net::TcpStream> {
        if self.tcp_nodelay {
            stream.set_nodelay(true)?;
        }

        let stream = stream.into_std()?;
        stream.set_nonblocking(true)?;
        Ok(stream)
    }
}
