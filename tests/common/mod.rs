#![allow(dead_code)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;

use stream_relay::RelayConfig;

/// Transcoder stand-in
pub struct FakeTranscoder {
    pub program: PathBuf,
    /// One line per termination signal received
    pub log: PathBuf,
    /// Created once the TERM trap is installed
    pub ready: PathBuf,
}

/// Logs each termination signal and otherwise idles
pub fn transcoder_script(dir: &Path) -> FakeTranscoder {
    let log = dir.join("signals");
    let ready = dir.join("ready");
    let program = dir.join("transcoder.sh");
    let body = format!(
        "#!/bin/sh\ntrap 'echo term >> {}; exit 0' TERM\ntouch {}\nwhile true; do sleep 0.05; done\n",
        log.display(),
        ready.display()
    );
    std::fs::write(&program, body).unwrap();
    std::fs::set_permissions(&program, std::fs::Permissions::from_mode(0o755)).unwrap();
    FakeTranscoder {
        program,
        log,
        ready,
    }
}

pub fn exiting_script(dir: &Path) -> PathBuf {
    let path = dir.join("exiting.sh");
    std::fs::write(&path, "#!/bin/sh\nexit 1\n").unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// Wait until `marker` exists, five seconds at most
pub async fn wait_for(marker: &Path) {
    for _ in 0..500 {
        if marker.exists() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("{} never appeared", marker.display());
}

/// Serve a repeating byte pattern to the first connection, `limit` bytes at most.
///
/// The port only starts listening once `ready` exists, so the relay cannot
/// connect before the fake transcoder is able to log its termination.
pub async fn fake_output(ready: &Path, limit: Option<usize>) -> u16 {
    let port = closed_port().await;
    let ready = ready.to_path_buf();

    tokio::spawn(async move {
        wait_for(&ready).await;
        let listener = TcpListener::bind(("127.0.0.1", port)).await.unwrap();
        let (mut socket, _) = listener.accept().await.unwrap();
        let block: Vec<u8> = (0..1024).map(|i| (i % 251) as u8).collect();
        let mut sent = 0;
        loop {
            let n = match limit {
                Some(limit) if sent >= limit => break,
                Some(limit) => block.len().min(limit - sent),
                None => block.len(),
            };
            if socket.write_all(&block[..n]).await.is_err() {
                break;
            }
            sent += n;
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    });

    port
}

/// A port with nothing listening on it
pub async fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

pub fn config(program: &Path, transcoder_port: u16) -> RelayConfig {
    RelayConfig::new("movie.mp4", "movie")
        .bind_ip("127.0.0.1".parse().unwrap())
        .listen_port(0)
        .transcoder_port(transcoder_port)
        .transcoder_program(program)
        .connect_backoff(Duration::from_millis(50))
        .terminate_grace(Duration::from_secs(2))
}

pub fn signal_count(log: &Path) -> usize {
    std::fs::read_to_string(log)
        .map(|s| s.lines().count())
        .unwrap_or(0)
}
