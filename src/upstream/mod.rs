//! Upstream reader
//!
//! Connects to the transcoder's output port and reads it in fixed-size
//! chunks. Chunk delivery is all-or-nothing: a chunk is returned only once
//! every byte of it has arrived.

use std::net::SocketAddr;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};

/// Connect to `addr`, retrying every `backoff` until it succeeds
///
/// The cancellation token is checked before every attempt and while waiting,
/// so a cancelled connect returns within one backoff interval. `liveness` is
/// called before every attempt; an error from it aborts the retry loop.
pub async fn connect<F>(
    addr: SocketAddr,
    backoff: Duration,
    cancel: &CancellationToken,
    mut liveness: F,
) -> Result<TcpStream>
where
    F: FnMut() -> Result<()>,
{
    let mut attempts = 0u32;

    loop {
        if cancel.is_cancelled() {
            tracing::info!(addr = %addr, attempts = attempts, "Upstream connect cancelled");
            return Err(Error::Cancelled);
        }

        liveness()?;
        attempts += 1;

        match TcpStream::connect(addr).await {
            Ok(stream) => {
                tracing::info!(addr = %addr, attempts = attempts, "Connected to upstream");
                return Ok(stream);
            }
            Err(e) => {
                tracing::trace!(addr = %addr, attempt = attempts, error = %e, "Upstream not ready");
            }
        }

        tokio::select! {
            _ = cancel.cancelled() => {}
            _ = tokio::time::sleep(backoff) => {}
        }
    }
}

/// Chunked reader over the transcoder's output
pub struct Upstream<R = TcpStream> {
    reader: R,
    chunk_size: usize,
    buf: BytesMut,
}

impl<R: AsyncRead + Unpin> Upstream<R> {
    /// Wrap a reader, producing chunks of `chunk_size` bytes
    pub fn new(reader: R, chunk_size: usize) -> Self {
        Self {
            reader,
            chunk_size,
            buf: BytesMut::with_capacity(chunk_size),
        }
    }

    /// Size of every chunk returned by [`read_chunk`](Self::read_chunk)
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Read exactly one chunk
    ///
    /// Tolerates short reads. Fails with `UpstreamClosed` if the stream ends
    /// mid-chunk and with `Cancelled` if the token fires first; the partial
    /// chunk is discarded either way.
    pub async fn read_chunk(&mut self, cancel: &CancellationToken) -> Result<Bytes> {
        self.buf.clear();
        self.buf.resize(self.chunk_size, 0);
        let mut filled = 0;

        while filled < self.chunk_size {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            let n = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                n = self.reader.read(&mut self.buf[filled..]) => n?,
            };

            if n == 0 {
                return Err(Error::UpstreamClosed {
                    received: filled,
                    expected: self.chunk_size,
                });
            }
            filled += n;
        }

        Ok(self.buf.split().freeze())
    }

    /// Access the underlying reader
    pub fn get_ref(&self) -> &R {
        &self.reader
    }
}

impl<R: AsyncRead + AsyncWrite + Unpin> Upstream<R> {
    /// Shut the connection down
    pub async fn shutdown(mut self) {
        if let Err(e) = self.reader.shutdown().await {
            tracing::debug!(error = %e, "Upstream shutdown failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use tokio::net::TcpListener;

    use super::*;

    #[tokio::test]
    async fn test_read_chunk_across_short_reads() {
        let mock = tokio_test::io::Builder::new()
            .read(b"ab")
            .read(b"c")
            .read(b"defgh")
            .build();
        let mut upstream = Upstream::new(mock, 4);
        let cancel = CancellationToken::new();

        assert_eq!(&upstream.read_chunk(&cancel).await.unwrap()[..], b"abcd");
        assert_eq!(&upstream.read_chunk(&cancel).await.unwrap()[..], b"efgh");
    }

    #[tokio::test]
    async fn test_read_chunk_never_short() {
        let mock = tokio_test::io::Builder::new()
            .read(b"abcd")
            .read(b"ef")
            .build();
        let mut upstream = Upstream::new(mock, 4);
        let cancel = CancellationToken::new();

        assert_eq!(upstream.read_chunk(&cancel).await.unwrap().len(), 4);

        let result = upstream.read_chunk(&cancel).await;
        assert!(matches!(
            result,
            Err(Error::UpstreamClosed {
                received: 2,
                expected: 4
            })
        ));
    }

    #[tokio::test]
    async fn test_read_chunk_error() {
        let mock = tokio_test::io::Builder::new()
            .read(b"a")
            .read_error(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset"))
            .build();
        let mut upstream = Upstream::new(mock, 4);

        let result = upstream.read_chunk(&CancellationToken::new()).await;
        match result {
            Err(Error::Io(e)) => assert_eq!(e.kind(), std::io::ErrorKind::ConnectionReset),
            other => panic!("expected I/O error, got {:?}", other.map(|b| b.len())),
        }
    }

    #[tokio::test]
    async fn test_read_chunk_cancelled_mid_read() {
        let (mut tx, rx) = tokio::io::duplex(64);
        let mut upstream = Upstream::new(rx, 8);
        let cancel = CancellationToken::new();

        tx.write_all(b"abc").await.unwrap();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let result = upstream.read_chunk(&cancel).await;
        assert!(matches!(result, Err(Error::Cancelled)));
        drop(tx);
    }

    #[tokio::test]
    async fn test_connect_cancelled_within_backoff() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });

        let started = Instant::now();
        let result = connect(addr, Duration::from_millis(500), &cancel, || Ok(())).await;

        assert!(matches!(result, Err(Error::Cancelled)));
        assert!(started.elapsed() < Duration::from_millis(600));
    }

    #[tokio::test]
    async fn test_connect_waits_for_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(150)).await;
            let listener = TcpListener::bind(addr).await.unwrap();
            let _ = listener.accept().await;
        });

        let cancel = CancellationToken::new();
        let mut checks = 0;
        let stream = connect(addr, Duration::from_millis(50), &cancel, || {
            checks += 1;
            Ok(())
        })
        .await
        .unwrap();

        assert_eq!(stream.peer_addr().unwrap(), addr);
        assert!(checks > 1);
    }

    #[tokio::test]
    async fn test_connect_aborts_when_liveness_fails() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let cancel = CancellationToken::new();
        let mut checks = 0;
        let result = connect(addr, Duration::from_millis(10), &cancel, || {
            checks += 1;
            if checks > 3 {
                Err(Error::Config("gone".into()))
            } else {
                Ok(())
            }
        })
        .await;

        assert!(matches!(result, Err(Error::Config(_))));
        assert_eq!(checks, 4);
    }

    #[tokio::test]
    async fn test_connect_already_cancelled() {
        let cancel = CancellationToken::new();
        cancel.cancel();

        let addr: SocketAddr = "127.0.0.1:9".parse().unwrap();
        let result = connect(addr, Duration::from_secs(1), &cancel, || Ok(())).await;
        assert!(matches!(result, Err(Error::Cancelled)));
    }
}
