//! Mount supervisor.
//!
//! Keeps one bucket mounted for as long as the process lives: obtains a
//! lease, writes it where the mount executable can read it, launches the
//! executable and then waits on whichever comes first of the process
//! exiting, the lease expiring, or shutdown.

pub mod credentials;
pub mod handshake;
pub mod mount_process;
pub mod mount_spec;

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::time::Instant;

use common::lease::{CredentialLease, IssueRequest, IssueResponse};
use common::path_hash::TargetPaths;

use crate::http_server::api::client::{BrokerClient, ClientError};

pub use credentials::CredentialsFile;
pub use mount_process::MountProcess;
pub use mount_spec::{MountSpec, MountSpecError, RenewalPolicy};

pub const DEFAULT_RESTART_BACKOFF: Duration = Duration::from_secs(1);
pub const DEFAULT_RENEWAL_RETRY: Duration = Duration::from_secs(10);
pub const DEFAULT_TERMINATION_GRACE: Duration = Duration::from_secs(5);
pub const DEFAULT_LEASE_TIMEOUT: Duration = Duration::from_secs(30);

/// Where the supervisor gets its credentials from.
#[async_trait::async_trait]
pub trait CredentialSource: Send + Sync {
    async fn issue(&self, request: IssueRequest) -> Result<IssueResponse, ClientError>;
}

#[async_trait::async_trait]
impl CredentialSource for BrokerClient {
    async fn issue(&self, request: IssueRequest) -> Result<IssueResponse, ClientError> {
        self.issue_credentials(request).await
    }
}

#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Executable that performs the actual mount
    pub mount_binary: PathBuf,
    /// Directory the credentials file is written to
    pub state_dir: PathBuf,
    /// Pause before relaunching a mount process that died on its own
    pub restart_backoff: Duration,
    /// Delay before retrying a failed renewal
    pub renewal_retry: Duration,
    /// How long the mount process gets to exit after SIGTERM
    pub termination_grace: Duration,
    /// Upper bound on a single lease request
    pub lease_timeout: Duration,
}

impl SupervisorConfig {
    pub fn new(mount_binary: impl Into<PathBuf>, state_dir: impl Into<PathBuf>) -> Self {
        Self {
            mount_binary: mount_binary.into(),
            state_dir: state_dir.into(),
            restart_backoff: DEFAULT_RESTART_BACKOFF,
            renewal_retry: DEFAULT_RENEWAL_RETRY,
            termination_grace: DEFAULT_TERMINATION_GRACE,
            lease_timeout: DEFAULT_LEASE_TIMEOUT,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    #[error("failed to get creds: {0}")]
    Lease(#[from] ClientError),
    #[error("no usable credentials returned for {0:?}")]
    NoCredentials(String),
    #[error("lease request timed out after {0:?}")]
    LeaseTimeout(Duration),
    #[error("failed to write credentials file {path}: {source}")]
    Credentials {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to spawn {binary}: {source}")]
    SpawnFailure {
        binary: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to wait on mount process: {0}")]
    Wait(#[source] io::Error),
    #[error("shutdown requested before the mount came up")]
    Cancelled,
}

pub struct Supervisor {
    spec: MountSpec,
    config: SupervisorConfig,
    source: Arc<dyn CredentialSource>,
    shutdown: watch::Receiver<bool>,
    credentials: CredentialsFile,
}

enum Wake {
    Shutdown,
    LeaseExpired,
    Exited(io::Result<std::process::ExitStatus>),
}

impl Supervisor {
    pub fn new(
        spec: MountSpec,
        config: SupervisorConfig,
        source: Arc<dyn CredentialSource>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        let paths = TargetPaths::new(&config.state_dir);
        let credentials = CredentialsFile::new(paths.credentials_file(&spec.target));
        Self {
            spec,
            config,
            source,
            shutdown,
            credentials,
        }
    }

    /// Acquire the first lease and launch the mount process.
    ///
    /// Any failure here means the mount never came up; the credentials file
    /// does not outlive the error.
    pub async fn start(self) -> Result<RunningMount, SupervisorError> {
        tracing::info!(
            mount_target = %self.spec.target.display(),
            bucket = %self.spec.bucket,
            secret_path = %self.spec.secret_path,
            policy = %self.spec.renewal_policy,
            "starting mount supervisor"
        );

        let mut shutdown = self.shutdown.clone();
        let lease = tokio::select! {
            biased;
            _ = shutdown.wait_for(|stop| *stop) => return Err(SupervisorError::Cancelled),
            lease = self.request_lease() => lease?,
        };

        self.write_credentials(&lease)?;
        let process = self.launch()?;

        Ok(RunningMount {
            supervisor: self,
            lease,
            process,
        })
    }

    async fn request_lease(&self) -> Result<CredentialLease, SupervisorError> {
        let request = IssueRequest::new(self.spec.secret_path.clone(), self.spec.requested_ttl);
        let response = tokio::time::timeout(self.config.lease_timeout, self.source.issue(request))
            .await
            .map_err(|_| SupervisorError::LeaseTimeout(self.config.lease_timeout))??;

        if !response.has_credentials() {
            return Err(SupervisorError::NoCredentials(self.spec.secret_path.clone()));
        }

        let lease = response.into_credential_lease(Utc::now());
        tracing::info!(
            lease_id = %lease.lease_id,
            access_key = %lease.masked_access_key(),
            expires_at = %lease.expiry.to_rfc3339(),
            "obtained lease"
        );
        Ok(lease)
    }

    fn write_credentials(&self, lease: &CredentialLease) -> Result<(), SupervisorError> {
        self.credentials
            .write(lease)
            .map_err(|source| SupervisorError::Credentials {
                path: self.credentials.path().to_path_buf(),
                source,
            })
    }

    fn launch(&self) -> Result<MountProcess, SupervisorError> {
        let args = self.spec.mount_args(self.credentials.path());
        MountProcess::spawn(&self.config.mount_binary, &args).map_err(|source| {
            tracing::error!(
                binary = %self.config.mount_binary.display(),
                "failed to spawn mount process: {}",
                source
            );
            SupervisorError::SpawnFailure {
                binary: self.config.mount_binary.clone(),
                source,
            }
        })
    }

    fn deadline_for(&self, lease: &CredentialLease) -> Instant {
        let remaining = lease.remaining(Utc::now());
        if remaining.is_zero() {
            Instant::now() + self.config.renewal_retry
        } else {
            Instant::now() + remaining
        }
    }
}

/// A supervisor whose mount process is up.
pub struct RunningMount {
    supervisor: Supervisor,
    lease: CredentialLease,
    process: MountProcess,
}

impl RunningMount {
    pub fn mount_pid(&self) -> u32 {
        self.process.pid()
    }

    pub fn lease(&self) -> &CredentialLease {
        &self.lease
    }

    pub fn credentials_path(&self) -> &Path {
        self.supervisor.credentials.path()
    }

    /// Supervise until shutdown. Returns `Ok` after a clean termination and
    /// an error only when the mount can no longer be kept alive.
    pub async fn supervise(self) -> Result<(), SupervisorError> {
        let RunningMount {
            supervisor,
            mut lease,
            mut process,
        } = self;
        let mut shutdown = supervisor.shutdown.clone();
        let mut deadline = supervisor.deadline_for(&lease);

        loop {
            let wake = tokio::select! {
                biased;
                _ = shutdown.wait_for(|stop| *stop) => Wake::Shutdown,
                _ = tokio::time::sleep_until(deadline) => Wake::LeaseExpired,
                status = process.wait() => Wake::Exited(status),
            };

            match wake {
                Wake::Shutdown => break,

                Wake::Exited(status) => {
                    let status = status.map_err(SupervisorError::Wait)?;
                    tracing::error!(
                        pid = process.pid(),
                        %status,
                        "mount process exited unexpectedly, restarting in {:?}",
                        supervisor.config.restart_backoff
                    );

                    let cancelled = tokio::select! {
                        biased;
                        _ = shutdown.wait_for(|stop| *stop) => true,
                        _ = tokio::time::sleep(supervisor.config.restart_backoff) => false,
                    };
                    if cancelled {
                        break;
                    }

                    if lease.is_expired_at(Utc::now()) {
                        tracing::warn!("lease expired while mount was down, renewing first");
                        let renewed = tokio::select! {
                            biased;
                            _ = shutdown.wait_for(|stop| *stop) => break,
                            renewed = supervisor.request_lease() => renewed,
                        };
                        match renewed.and_then(|new| {
                            supervisor.write_credentials(&new)?;
                            Ok(new)
                        }) {
                            Ok(new) => {
                                lease = new;
                                deadline = supervisor.deadline_for(&lease);
                            }
                            Err(e) => {
                                tracing::warn!("failed to renew credentials: {}", e);
                                deadline = Instant::now() + supervisor.config.renewal_retry;
                            }
                        }
                    }

                    process = supervisor.launch()?;
                }

                Wake::LeaseExpired => {
                    tracing::warn!(
                        lease_id = %lease.lease_id,
                        "issuing new credentials: credentials expired"
                    );
                    let renewed = tokio::select! {
                        biased;
                        _ = shutdown.wait_for(|stop| *stop) => break,
                        renewed = supervisor.request_lease() => renewed,
                    };

                    match renewed.and_then(|new| {
                        supervisor.write_credentials(&new)?;
                        Ok(new)
                    }) {
                        Ok(new) => {
                            lease = new;
                            deadline = supervisor.deadline_for(&lease);

                            if supervisor.spec.renewal_policy == RenewalPolicy::Restart {
                                tracing::info!("relaunching mount process with fresh credentials");
                                if let Err(e) = process
                                    .terminate(supervisor.config.termination_grace)
                                    .await
                                {
                                    tracing::warn!("failed to stop mount process: {}", e);
                                }
                                process = supervisor.launch()?;
                            }
                        }
                        Err(e) => {
                            tracing::warn!(
                                "failed to get credentials, retrying in {:?}: {}",
                                supervisor.config.renewal_retry,
                                e
                            );
                            deadline = Instant::now() + supervisor.config.renewal_retry;
                        }
                    }
                }
            }
        }

        tracing::warn!("terminating due to shutdown request");
        match process.terminate(supervisor.config.termination_grace).await {
            Ok(status) => tracing::info!(%status, "mount process stopped"),
            Err(e) => tracing::error!("failed to stop mount process: {}", e),
        }

        tracing::info!(
            path = %supervisor.credentials.path().display(),
            "removing credential file"
        );
        if let Err(e) = supervisor.credentials.remove() {
            tracing::error!("failed to remove credential file: {}", e);
        }

        tracing::info!("terminated");
        Ok(())
    }
}
