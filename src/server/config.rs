//! Relay configuration

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::stream::descriptor::{endpoint, StreamDescriptor};

/// Default viewer listen port
pub const DEFAULT_LISTEN_PORT: u16 = 9600;
/// Default port the transcoder serves its output on
pub const DEFAULT_TRANSCODER_PORT: u16 = 9601;
/// Default video size passed to the transcoder
pub const DEFAULT_VIDEO_SIZE: &str = "480x270";
/// Default video bit rate passed to the transcoder
pub const DEFAULT_BIT_RATE: &str = "400k";
/// Default transcoder launcher
pub const DEFAULT_TRANSCODER_PROGRAM: &str = "./streamer_ffmpeg.sh";
/// Bytes moved from upstream to viewers per unit of work
pub const DEFAULT_CHUNK_SIZE: usize = 256;

/// Relay configuration options
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Source media handed to the transcoder
    pub source_path: PathBuf,

    /// Stream name announced to the directory
    pub stream_name: String,

    /// Endpoint transport advertised to viewers
    pub transport: String,

    /// Endpoint host advertised to viewers
    pub host: String,

    /// Interface the viewer listener binds to
    pub bind_ip: IpAddr,

    /// Viewer listen port
    pub listen_port: u16,

    /// Port the transcoder serves its output on (always on loopback)
    pub transcoder_port: u16,

    /// Video size passed to the transcoder
    pub video_size: String,

    /// Video bit rate passed to the transcoder
    pub bit_rate: String,

    /// Search keywords
    pub keywords: Vec<String>,

    /// Transcoder executable
    pub transcoder_program: PathBuf,

    /// Pending connection backlog of the listen socket
    pub listen_backlog: u32,

    /// Enable TCP_NODELAY on viewer sockets
    pub tcp_nodelay: bool,

    /// Size of one relayed chunk
    pub chunk_size: usize,

    /// Pause between accept checks
    pub cycle_delay: Duration,

    /// Maximum time spent broadcasting before accepting again
    pub tick_budget: Duration,

    /// Wait between upstream connect attempts
    pub connect_backoff: Duration,

    /// How long shutdown waits for the transcoder before killing it
    pub terminate_grace: Duration,
}

impl RelayConfig {
    /// Create a config for a source and stream name, everything else defaulted
    pub fn new(source_path: impl Into<PathBuf>, stream_name: impl Into<String>) -> Self {
        Self {
            source_path: source_path.into(),
            stream_name: stream_name.into(),
            transport: "tcp".to_string(),
            host: "localhost".to_string(),
            bind_ip: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            listen_port: DEFAULT_LISTEN_PORT,
            transcoder_port: DEFAULT_TRANSCODER_PORT,
            video_size: DEFAULT_VIDEO_SIZE.to_string(),
            bit_rate: DEFAULT_BIT_RATE.to_string(),
            keywords: Vec::new(),
            transcoder_program: PathBuf::from(DEFAULT_TRANSCODER_PROGRAM),
            listen_backlog: 10,
            tcp_nodelay: true,
            chunk_size: DEFAULT_CHUNK_SIZE,
            cycle_delay: Duration::from_millis(20),
            tick_budget: Duration::from_millis(30),
            connect_backoff: Duration::from_millis(500),
            terminate_grace: Duration::from_secs(5),
        }
    }

    /// Set the advertised transport
    pub fn transport(mut self, transport: impl Into<String>) -> Self {
        self.transport = transport.into();
        self
    }

    /// Set the advertised host
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Set the interface the listener binds to
    pub fn bind_ip(mut self, ip: IpAddr) -> Self {
        self.bind_ip = ip;
        self
    }

    /// Set the viewer listen port
    pub fn listen_port(mut self, port: u16) -> Self {
        self.listen_port = port;
        self
    }

    /// Set the transcoder output port
    pub fn transcoder_port(mut self, port: u16) -> Self {
        self.transcoder_port = port;
        self
    }

    /// Set the video size
    pub fn video_size(mut self, size: impl Into<String>) -> Self {
        self.video_size = size.into();
        self
    }

    /// Set the bit rate
    pub fn bit_rate(mut self, rate: impl Into<String>) -> Self {
        self.bit_rate = rate.into();
        self
    }

    /// Set the keywords
    pub fn keywords(mut self, keywords: Vec<String>) -> Self {
        self.keywords = keywords;
        self
    }

    /// Set the transcoder executable
    pub fn transcoder_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.transcoder_program = program.into();
        self
    }

    /// Set the connect retry interval
    pub fn connect_backoff(mut self, backoff: Duration) -> Self {
        self.connect_backoff = backoff;
        self
    }

    /// Set the transcoder termination grace period
    pub fn terminate_grace(mut self, grace: Duration) -> Self {
        self.terminate_grace = grace;
        self
    }

    /// Address the viewer listener binds to
    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_ip, self.listen_port)
    }

    /// Address the transcoder output is read from
    pub fn transcoder_addr(&self) -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), self.transcoder_port)
    }

    /// Endpoint string handed to the transcoder
    pub fn transcoder_endpoint(&self) -> String {
        endpoint(&self.transport, "127.0.0.1", self.transcoder_port)
    }

    /// Build the descriptor announced to the directory
    pub fn descriptor(&self) -> StreamDescriptor {
        StreamDescriptor::new(
            self.stream_name.clone(),
            endpoint(&self.transport, &self.host, self.listen_port),
            self.video_size.clone(),
            self.bit_rate.clone(),
            self.keywords.clone(),
        )
    }

    /// Reject settings the relay cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(Error::Config("chunk size must be non-zero".into()));
        }
        if self.transcoder_port == 0 {
            return Err(Error::Config("transcoder port must be non-zero".into()));
        }
        if self.listen_port != 0 && self.listen_port == self.transcoder_port {
            return Err(Error::Config(format!(
                "listen port and transcoder port are both {}",
                self.listen_port
            )));
        }
        Ok(())
    }
}

/// Split a comma separated keyword list
///
/// An empty list yields no keywords and a trailing comma does not add an
/// empty keyword, but empty keywords between commas are kept.
pub fn parse_keywords(csv: &str) -> Vec<String> {
    if csv.is_empty() {
        return Vec::new();
    }

    let mut keywords: Vec<String> = csv.split(',').map(str::to_string).collect();
    if keywords.last().is_some_and(|k| k.is_empty()) {
        keywords.pop();
    }
    keywords
}
