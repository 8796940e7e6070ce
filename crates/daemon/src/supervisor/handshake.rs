//! Parent/child handshake used when a mount detaches into the background.
//!
//! The `mount` command re-executes the binary as a detached `supervise`
//! process whose stdout is a pipe back to the parent. The child writes
//! exactly one JSON line once it knows whether the mount came up, and the
//! parent does not report anything before reading it.

use std::ffi::OsString;
use std::io::{self, Write};
use std::os::fd::AsRawFd;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum Handshake {
    /// The mount subprocess is running with this pid.
    Ready { pid: u32 },
    Failed { message: String },
}

#[derive(Debug, thiserror::Error)]
pub enum HandshakeError {
    #[error("failed to launch supervisor: {0}")]
    Launch(#[source] io::Error),
    #[error("failed to read supervisor handshake: {0}")]
    Read(#[source] io::Error),
    #[error("supervisor exited without reporting ({0})")]
    Closed(String),
    #[error("supervisor sent an invalid handshake {line:?}: {source}")]
    Invalid {
        line: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("supervisor did not report within {0:?}")]
    Timeout(Duration),
    #[error("{0}")]
    Failed(String),
}

/// A supervisor that confirmed its mount is up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Detached {
    pub supervisor_pid: u32,
    pub mount_pid: u32,
}

/// Child side: write the handshake line and detach stdout from the pipe.
///
/// After this returns the parent may exit at any time, so fd 1 is pointed
/// at `/dev/null` to keep later writes from hitting a closed pipe.
pub fn report(handshake: &Handshake) -> io::Result<()> {
    let written = write_line(handshake);
    let detached = detach_stdout();
    written.and(detached)
}

fn write_line(handshake: &Handshake) -> io::Result<()> {
    let mut stdout = io::stdout().lock();
    serde_json::to_writer(&mut stdout, handshake)?;
    stdout.write_all(b"\n")?;
    stdout.flush()
}

fn detach_stdout() -> io::Result<()> {
    let devnull = std::fs::OpenOptions::new().write(true).open("/dev/null")?;
    // SAFETY: both descriptors are valid for the duration of the call.
    if unsafe { libc::dup2(devnull.as_raw_fd(), libc::STDOUT_FILENO) } == -1 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// Parent side: start `program args` in a new session and wait for its
/// handshake line.
pub async fn launch_detached(
    program: &Path,
    args: &[OsString],
    timeout: Duration,
) -> Result<Detached, HandshakeError> {
    let mut command = Command::new(program);
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null());
    // SAFETY: setsid is async-signal-safe and touches no memory.
    unsafe {
        command.pre_exec(|| {
            if libc::setsid() == -1 {
                return Err(io::Error::last_os_error());
            }
            Ok(())
        });
    }

    let mut child = command.spawn().map_err(HandshakeError::Launch)?;
    let supervisor_pid = child
        .id()
        .ok_or_else(|| HandshakeError::Closed("exited immediately".to_string()))?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| HandshakeError::Closed("no stdout pipe".to_string()))?;

    tracing::debug!(supervisor_pid, "waiting for supervisor handshake");
    let mut lines = BufReader::new(stdout).lines();
    let line = match tokio::time::timeout(timeout, lines.next_line()).await {
        Ok(Ok(line)) => line,
        Ok(Err(e)) => {
            reap(child, Duration::ZERO).await;
            return Err(HandshakeError::Read(e));
        }
        Err(_) => {
            reap(child, Duration::ZERO).await;
            return Err(HandshakeError::Timeout(timeout));
        }
    };

    let Some(line) = line else {
        let reason = match tokio::time::timeout(Duration::from_secs(1), child.wait()).await {
            Ok(Ok(status)) => status.to_string(),
            _ => "pipe closed".to_string(),
        };
        return Err(HandshakeError::Closed(reason));
    };

    match serde_json::from_str(&line) {
        Ok(Handshake::Ready { pid }) => Ok(Detached {
            supervisor_pid,
            mount_pid: pid,
        }),
        Ok(Handshake::Failed { message }) => {
            reap(child, Duration::from_secs(1)).await;
            Err(HandshakeError::Failed(message))
        }
        Err(source) => {
            reap(child, Duration::ZERO).await;
            Err(HandshakeError::Invalid { line, source })
        }
    }
}

/// Give a supervisor that will not be registered `grace` to exit on its
/// own, then kill it. Nothing could tear it down later.
async fn reap(mut child: Child, grace: Duration) {
    if !grace.is_zero() && tokio::time::timeout(grace, child.wait()).await.is_ok() {
        return;
    }
    if let Err(e) = child.start_kill() {
        tracing::warn!("failed to kill unconfirmed supervisor: {}", e);
    }
    let _ = child.wait().await;
}
