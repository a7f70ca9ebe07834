//! `streamer`: relay a transcoded video file to TCP viewers
//!
//! ```bash
//! streamer movie.mp4 movie
//! streamer movie.mp4 movie --port 9700 --ffmpeg-port 9701 --keywords news,live
//! RUST_LOG=stream_relay=debug streamer movie.mp4 movie --portal portal.lan:9500
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tokio_util::sync::CancellationToken;

use stream_relay::directory::client::DEFAULT_PORTAL_ADDR;
use stream_relay::server::config::{
    parse_keywords, DEFAULT_BIT_RATE, DEFAULT_LISTEN_PORT, DEFAULT_TRANSCODER_PORT,
    DEFAULT_TRANSCODER_PROGRAM, DEFAULT_VIDEO_SIZE,
};
use stream_relay::{PortalClient, Relay, RelayConfig, StopReason};

#[derive(Parser, Debug)]
#[command(name = "streamer", version, about = "Relay a transcoded video stream to TCP viewers")]
struct Cli {
    /// Video file handed to the transcoder
    video_file: PathBuf,

    /// Stream name announced to the portal
    stream_name: String,

    /// Endpoint transport protocol
    #[arg(long, default_value = "tcp")]
    transport: String,

    /// Endpoint host advertised to viewers
    #[arg(long, default_value = "localhost")]
    host: String,

    /// Viewer listen port
    #[arg(long, default_value_t = DEFAULT_LISTEN_PORT)]
    port: u16,

    /// Port of the transcoder output
    #[arg(long, alias = "ffmpeg_port", default_value_t = DEFAULT_TRANSCODER_PORT)]
    ffmpeg_port: u16,

    /// Video size
    #[arg(long, alias = "video_size", default_value = DEFAULT_VIDEO_SIZE)]
    video_size: String,

    /// Video bit rate
    #[arg(long, alias = "bit_rate", default_value = DEFAULT_BIT_RATE)]
    bit_rate: String,

    /// Comma separated search keywords
    #[arg(long, default_value = "")]
    keywords: String,

    /// Transcoder launcher
    #[arg(long, default_value = DEFAULT_TRANSCODER_PROGRAM)]
    transcoder: PathBuf,

    /// Portal address
    #[arg(long, env = "STREAMER_PORTAL", default_value = DEFAULT_PORTAL_ADDR)]
    portal: String,
}

impl Cli {
    fn into_config(self) -> RelayConfig {
        RelayConfig::new(self.video_file, self.stream_name)
            .transport(self.transport)
            .host(self.host)
            .listen_port(self.port)
            .transcoder_port(self.ffmpeg_port)
            .video_size(self.video_size)
            .bit_rate(self.bit_rate)
            .keywords(parse_keywords(&self.keywords))
            .transcoder_program(self.transcoder)
    }
}

fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
}

/// Resolve on SIGINT. Never resolves if the handler cannot be installed.
async fn ctrl_c_or_pending() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to install SIGINT handler");
        std::future::pending::<()>().await;
    }
}

/// Cancel `token` on SIGINT or SIGTERM
fn spawn_signal_handler(token: CancellationToken) {
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};

            match signal(SignalKind::terminate()) {
                Ok(mut terminate) => {
                    tokio::select! {
                        _ = ctrl_c_or_pending() => {}
                        _ = terminate.recv() => {}
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to install SIGTERM handler");
                    ctrl_c_or_pending().await;
                }
            }
        }

        #[cfg(not(unix))]
        ctrl_c_or_pending().await;

        tracing::info!("Exiting...");
        token.cancel();
    });
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if e.use_stderr() => {
            let _ = e.print();
            return ExitCode::from(1);
        }
        Err(e) => {
            // --help and --version
            let _ = e.print();
            return ExitCode::SUCCESS;
        }
    };

    init_logging();

    let portal = match PortalClient::lookup(&cli.portal).await {
        Ok(portal) => portal,
        Err(e) => {
            tracing::error!(error = %e, "Failed to find portal");
            return ExitCode::from(1);
        }
    };

    let cancel = CancellationToken::new();
    spawn_signal_handler(cancel.clone());

    let mut relay = Relay::new(cli.into_config(), portal, cancel);

    match relay.run().await {
        Ok(StopReason::Cancelled) => ExitCode::SUCCESS,
        Ok(StopReason::UpstreamEnded(e)) => {
            tracing::info!(reason = %e, "Stream ended");
            ExitCode::SUCCESS
        }
        // already logged by the relay
        Err(_) => ExitCode::from(1),
    }
}
