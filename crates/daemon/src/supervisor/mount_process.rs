//! The external mount executable, run in the foreground as our child.

use std::ffi::OsString;
use std::io;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};

pub struct MountProcess {
    child: Child,
    pid: u32,
}

impl MountProcess {
    /// Launch `binary` with `args`. Its output is forwarded into our log.
    pub fn spawn(binary: &Path, args: &[OsString]) -> io::Result<Self> {
        let mut child = Command::new(binary)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let pid = child.id().ok_or_else(|| {
            io::Error::new(io::ErrorKind::Other, "mount process exited before it got a pid")
        })?;

        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(forward_output(stdout, pid, "stdout"));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward_output(stderr, pid, "stderr"));
        }

        tracing::info!(pid, binary = %binary.display(), "mount process started");
        Ok(Self { child, pid })
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Wait for the process to exit. Cancel safe.
    pub async fn wait(&mut self) -> io::Result<ExitStatus> {
        self.child.wait().await
    }

    /// SIGTERM the process, then SIGKILL it if it outlives `grace`.
    pub async fn terminate(mut self, grace: Duration) -> io::Result<ExitStatus> {
        if let Some(status) = self.child.try_wait()? {
            tracing::debug!(pid = self.pid, %status, "mount process already exited");
            return Ok(status);
        }

        tracing::info!(pid = self.pid, "sending SIGTERM to mount process");
        signal(self.pid, libc::SIGTERM)?;

        match tokio::time::timeout(grace, self.child.wait()).await {
            Ok(status) => status,
            Err(_) => {
                tracing::warn!(
                    pid = self.pid,
                    "mount process still alive after {:?}, killing",
                    grace
                );
                self.child.start_kill()?;
                self.child.wait().await
            }
        }
    }
}

/// Send `sig` to `pid`. A process that is already gone is not an error.
pub fn signal(pid: u32, sig: libc::c_int) -> io::Result<()> {
    let pid = libc::pid_t::try_from(pid)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "pid out of range"))?;
    // SAFETY: kill(2) has no memory-safety preconditions.
    if unsafe { libc::kill(pid, sig) } == 0 {
        return Ok(());
    }
    let err = io::Error::last_os_error();
    if err.raw_os_error() == Some(libc::ESRCH) {
        Ok(())
    } else {
        Err(err)
    }
}

/// Whether a process with this pid still exists.
pub fn is_alive(pid: u32) -> bool {
    let Ok(pid) = libc::pid_t::try_from(pid) else {
        return false;
    };
    // SAFETY: signal 0 only performs the existence and permission check.
    if unsafe { libc::kill(pid, 0) } == 0 {
        return true;
    }
    io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

async fn forward_output<R: AsyncRead + Unpin>(reader: R, pid: u32, stream: &'static str) {
    let mut lines = BufReader::new(reader).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => tracing::info!(target: "mount", pid, stream, "{}", line),
            Ok(None) => break,
            Err(e) => {
                tracing::debug!(pid, stream, "stopped reading mount output: {}", e);
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str) -> Vec<OsString> {
        vec!["-c".into(), script.into()]
    }

    #[tokio::test]
    async fn test_wait_reports_exit() {
        let mut process = MountProcess::spawn(Path::new("/bin/sh"), &sh("exit 3")).unwrap();
        let status = process.wait().await.unwrap();
        assert_eq!(status.code(), Some(3));
    }

    #[tokio::test]
    async fn test_terminate_stops_sleeping_process() {
        let process = MountProcess::spawn(Path::new("/bin/sh"), &sh("exec sleep 30")).unwrap();
        let status = process.terminate(Duration::from_secs(5)).await.unwrap();
        assert!(!status.success());
    }

    #[tokio::test]
    async fn test_terminate_escalates_to_kill() {
        let process = MountProcess::spawn(
            Path::new("/bin/sh"),
            &sh("trap '' TERM; while true; do sleep 0.1; done"),
        )
        .unwrap();
        // give the shell time to install its trap
        tokio::time::sleep(Duration::from_millis(200)).await;

        let started = std::time::Instant::now();
        let status = process
            .terminate(Duration::from_millis(300))
            .await
            .unwrap();
        assert!(!status.success());
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_signal_missing_process_is_ok() {
        // pid_max is far below this on Linux
        signal(i32::MAX as u32, 0).unwrap();
        assert!(!is_alive(i32::MAX as u32));
        assert!(is_alive(std::process::id()));
    }

    #[tokio::test]
    async fn test_spawn_missing_binary_fails() {
        let err = MountProcess::spawn(Path::new("/nonexistent/mount-bin"), &[]).err().unwrap();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}
