//! Relay counters

use std::time::{Duration, Instant};

/// Counters accumulated over one relay run
#[derive(Debug, Clone)]
pub struct RelayStats {
    /// When relaying started
    pub started_at: Instant,
    /// Chunks read from upstream and broadcast
    pub chunks_relayed: u64,
    /// Bytes read from upstream
    pub bytes_relayed: u64,
    /// Bytes written to viewers, summed over all viewers
    pub bytes_sent: u64,
    /// Viewers accepted
    pub clients_accepted: u64,
    /// Viewers dropped after a failed write
    pub clients_dropped: u64,
}

impl RelayStats {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            chunks_relayed: 0,
            bytes_relayed: 0,
            bytes_sent: 0,
            clients_accepted: 0,
            clients_dropped: 0,
        }
    }

    /// Record one broadcast chunk
    pub fn record_chunk(&mut self, len: usize, delivered: usize, dropped: usize) {
        self.chunks_relayed += 1;
        self.bytes_relayed += len as u64;
        self.bytes_sent += (len * delivered) as u64;
        self.clients_dropped += dropped as u64;
    }

    /// Time since relaying started
    pub fn duration(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Average upstream bitrate in bits per second
    pub fn bitrate(&self) -> u64 {
        bitrate(self.bytes_relayed, self.duration())
    }
}

impl Default for RelayStats {
    fn default() -> Self {
        Self::new()
    }
}

fn bitrate(bytes: u64, duration: Duration) -> u64 {
    let secs = duration.as_secs();
    if secs > 0 {
        (bytes * 8) / secs
    } else {
        0
    }
}
