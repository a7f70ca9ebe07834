//! Transcoder supervisor
//!
//! Owns the external transcoder process. The transcoder is launched with four
//! positional arguments:
//!
//! 1. source media path
//! 2. output endpoint, `transport://127.0.0.1:port`
//! 3. video size, e.g. `480x270`
//! 4. video bit rate, e.g. `400k`
//!
//! It must serve its raw output to whoever connects to that port. There is no
//! ready signal: the port becoming connectable is the only indication.

use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::process::{Child, Command};

use crate::error::{Error, Result};
use crate::server::config::RelayConfig;

/// Handle to a running transcoder process
pub struct Transcoder {
    child: Child,
    pid: Option<u32>,
}

impl Transcoder {
    /// Launch the transcoder without waiting for it to become ready
    pub fn spawn(
        program: &Path,
        source: &Path,
        endpoint: &str,
        video_size: &str,
        bit_rate: &str,
    ) -> Result<Self> {
        let child = Command::new(program)
            .arg(source)
            .arg(endpoint)
            .arg(video_size)
            .arg(bit_rate)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| Error::Spawn {
                program: program.display().to_string(),
                source,
            })?;

        let pid = child.id();
        tracing::info!(
            pid = ?pid,
            program = %program.display(),
            endpoint = endpoint,
            "Transcoder started"
        );

        Ok(Self { child, pid })
    }

    /// Launch the transcoder described by a relay config
    pub fn from_config(config: &RelayConfig) -> Result<Self> {
        Self::spawn(
            &config.transcoder_program,
            &config.source_path,
            &config.transcoder_endpoint(),
            &config.video_size,
            &config.bit_rate,
        )
    }

    /// Process id, as reported at spawn time
    pub fn id(&self) -> Option<u32> {
        self.pid
    }

    /// Poll for exit without blocking
    ///
    /// Returns `TranscoderExited` once the process is gone.
    pub fn check_running(&mut self) -> Result<()> {
        match self.child.try_wait()? {
            Some(status) => Err(Error::TranscoderExited(status)),
            None => Ok(()),
        }
    }

    /// Ask the transcoder to stop and reap it
    ///
    /// Waits at most `grace` after the termination signal, then kills the
    /// process. Failures are logged; the exit status is returned if known.
    pub async fn terminate(mut self, grace: Duration) -> Option<ExitStatus> {
        match self.child.try_wait() {
            Ok(Some(status)) => {
                tracing::info!(pid = ?self.pid, status = %status, "Transcoder already exited");
                return Some(status);
            }
            Ok(None) => {}
            Err(e) => tracing::warn!(pid = ?self.pid, error = %e, "Failed to poll transcoder"),
        }

        tracing::info!(pid = ?self.pid, "Sending termination signal to transcoder");
        if let Err(e) = self.signal_terminate() {
            tracing::warn!(pid = ?self.pid, error = %e, "Failed to signal transcoder");
        }

        tracing::info!(pid = ?self.pid, "Waiting on transcoder to exit");
        match tokio::time::timeout(grace, self.child.wait()).await {
            Ok(Ok(status)) => {
                tracing::info!(pid = ?self.pid, status = %status, "Transcoder exited");
                Some(status)
            }
            Ok(Err(e)) => {
                tracing::error!(pid = ?self.pid, error = %e, "Failed to reap transcoder");
                None
            }
            Err(_) => {
                tracing::warn!(
                    pid = ?self.pid,
                    grace_ms = grace.as_millis() as u64,
                    "Transcoder ignored termination, killing"
                );
                if let Err(e) = self.child.kill().await {
                    tracing::error!(pid = ?self.pid, error = %e, "Failed to kill transcoder");
                    return None;
                }
                self.child.wait().await.ok()
            }
        }
    }

    #[cfg(unix)]
    fn signal_terminate(&mut self) -> std::io::Result<()> {
        // `id()` is None once the child has been reaped
        let Some(pid) = self.child.id() else {
            return Ok(());
        };
        let pid = libc::pid_t::try_from(pid)
            .map_err(|_| std::io::Error::new(std::io::ErrorKind::InvalidInput, "pid out of range"))?;

        // SAFETY: pid refers to our own child, which has not been reaped yet.
        if unsafe { libc::kill(pid, libc::SIGTERM) } == 0 {
            Ok(())
        } else {
            Err(std::io::Error::last_os_error())
        }
    }

    #[cfg(not(unix))]
    fn signal_terminate(&mut self) -> std::io::Result<()> {
        self.child.start_kill()
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::os::unix::fs::PermissionsExt;
    use std::os::unix::process::ExitStatusExt;
    use std::path::PathBuf;

    use super::*;

    fn script(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("transcoder.sh");
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn spawn(program: &Path) -> Result<Transcoder> {
        Transcoder::spawn(
            program,
            Path::new("movie.mp4"),
            "tcp://127.0.0.1:9601",
            "480x270",
            "400k",
        )
    }

    #[tokio::test]
    async fn test_spawn_missing_program() {
        let result = spawn(Path::new("/nonexistent/transcoder"));
        assert!(matches!(result, Err(Error::Spawn { .. })));
    }

    #[tokio::test]
    async fn test_positional_arguments() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("args");
        let program = script(
            dir.path(),
            &format!("printf '%s\\n' \"$@\" > {}.tmp\nmv {0}.tmp {0}\nexec sleep 30", out.display()),
        );

        let transcoder = spawn(&program).unwrap();
        assert!(transcoder.id().is_some());

        let mut args = None;
        for _ in 0..100 {
            if let Ok(contents) = std::fs::read_to_string(&out) {
                args = Some(contents);
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        transcoder.terminate(Duration::from_secs(2)).await;

        let args = args.expect("transcoder never wrote its arguments");
        let args: Vec<&str> = args.lines().collect();
        assert_eq!(
            args,
            vec!["movie.mp4", "tcp://127.0.0.1:9601", "480x270", "400k"]
        );
    }

    #[tokio::test]
    async fn test_terminate_sends_sigterm() {
        let dir = tempfile::tempdir().unwrap();
        let program = script(dir.path(), "exec sleep 30");

        let mut transcoder = spawn(&program).unwrap();
        assert!(transcoder.check_running().is_ok());

        let status = transcoder.terminate(Duration::from_secs(2)).await.unwrap();
        assert_eq!(status.signal(), Some(libc::SIGTERM));
    }

    #[tokio::test]
    async fn test_terminate_kills_after_grace() {
        let dir = tempfile::tempdir().unwrap();
        let program = script(dir.path(), "trap '' TERM\nwhile true; do sleep 0.05; done");

        let transcoder = spawn(&program).unwrap();
        // let the shell install its trap
        tokio::time::sleep(Duration::from_millis(200)).await;

        let started = std::time::Instant::now();
        let status = transcoder.terminate(Duration::from_millis(200)).await.unwrap();

        assert_eq!(status.signal(), Some(libc::SIGKILL));
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_check_running_detects_exit() {
        let dir = tempfile::tempdir().unwrap();
        let program = script(dir.path(), "exit 3");

        let mut transcoder = spawn(&program).unwrap();

        let mut exited = None;
        for _ in 0..100 {
            if let Err(e) = transcoder.check_running() {
                exited = Some(e);
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        match exited {
            Some(Error::TranscoderExited(status)) => assert_eq!(status.code(), Some(3)),
            other => panic!("expected early exit, got {:?}", other),
        }

        // terminating an exited process only reports its status
        let status = transcoder.terminate(Duration::from_millis(100)).await.unwrap();
        assert_eq!(status.code(), Some(3));
    }
}
