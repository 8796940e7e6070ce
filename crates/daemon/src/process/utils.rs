use std::io;
use std::time::Duration;

use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Spawns a task that listens for SIGINT and SIGTERM and flips the shutdown
/// watch to `true`.
///
/// On SIGTERM the flip is delayed by `sigterm_grace`. The task also ends
/// when shutdown is triggered through the returned sender, so it can always
/// be joined.
pub fn graceful_shutdown_blocker(
    sigterm_grace: Duration,
) -> io::Result<(JoinHandle<()>, watch::Sender<bool>, watch::Receiver<bool>)> {
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;

    let (tx, rx) = watch::channel(false);
    let signal_tx = tx.clone();
    let mut requested = rx.clone();

    let handle = tokio::spawn(async move {
        let on_sigterm = tokio::select! {
            _ = sigint.recv() => false,
            _ = sigterm.recv() => true,
            _ = async { let _ = requested.wait_for(|stop| *stop).await; } => {
                tracing::debug!("shutdown requested programmatically");
                return;
            }
        };

        if on_sigterm {
            if !sigterm_grace.is_zero() {
                tokio::time::sleep(sigterm_grace).await;
            }
            tracing::debug!("initiating graceful shutdown on SIGTERM");
        } else {
            tracing::debug!("gracefully exiting immediately on SIGINT");
        }

        signal_tx.send_replace(true);
    });

    Ok((handle, tx, rx))
}

/// Registers a panic hook that logs panics using the `tracing` crate
pub fn register_panic_logger() {
    std::panic::set_hook(Box::new(|panic| match panic.location() {
        Some(loc) => {
            tracing::error!(
                message = %panic,
                panic.file = loc.file(),
                panic.line = loc.line(),
                panic.column = loc.column(),
            );
        }
        None => tracing::error!(message = %panic),
    }));
}

pub fn report_build_info(component: &str) {
    let build = common::prelude::build_info();

    tracing::info!(
        component,
        build_profile = ?build.build_profile,
        features = ?build.build_features,
        version = ?build.version,
        repo_version = ?build.repo_version,
        "starting up"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_programmatic_shutdown_ends_signal_task() {
        let (handle, tx, mut rx) = graceful_shutdown_blocker(Duration::ZERO).unwrap();
        tx.send_replace(true);

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(*rx.borrow_and_update());
    }

    #[tokio::test]
    async fn test_sigterm_flips_after_grace() {
        let (handle, _tx, mut rx) = graceful_shutdown_blocker(Duration::from_millis(300)).unwrap();

        let rc = unsafe { libc::kill(libc::getpid(), libc::SIGTERM) };
        assert_eq!(rc, 0);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!*rx.borrow());

        tokio::time::timeout(Duration::from_secs(2), rx.wait_for(|stop| *stop))
            .await
            .unwrap()
            .unwrap();
        handle.await.unwrap();
    }
}
