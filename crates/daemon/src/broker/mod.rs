//! Credential broker.
//!
//! Holds the single trusted backend handle and turns issuance requests into
//! credential leases. The broker keeps no per-call state, so one instance
//! is cloned into every request handler.

pub mod backend;
pub mod vault;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use common::lease::{mask, IssueRequest, IssueResponse, Lease};

pub use backend::{BackendError, BackendSecret, SecretsBackend};
pub use vault::{VaultBackend, VaultConfig};

/// Keys the object-storage secrets engine stores the credential pair under.
pub const ACCESS_KEY_FIELD: &str = "accessKeyId";
pub const SECRET_KEY_FIELD: &str = "secretAccessKey";

#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    #[error("secrets backend unavailable: {0}")]
    BackendUnavailable(#[from] BackendError),
    #[error("no response returned from secrets backend for {0}")]
    EmptyResponse(String),
}

#[derive(Clone)]
pub struct Broker {
    backend: Arc<dyn SecretsBackend>,
    fallback_lease: Duration,
}

impl Broker {
    pub fn new(backend: Arc<dyn SecretsBackend>, fallback_lease: Duration) -> Self {
        Self {
            backend,
            fallback_lease,
        }
    }

    /// Issue credentials for `request.path`.
    ///
    /// The path is passed through untouched; the backend decides access.
    /// Missing credential fields come back as empty strings and it is up to
    /// the caller to reject them.
    pub async fn issue_credentials(
        &self,
        request: IssueRequest,
    ) -> Result<IssueResponse, BrokerError> {
        let ttl = request.ttl_hint();
        tracing::info!(path = %request.path, ttl = ?ttl, "issuing credentials");

        let secret = self
            .backend
            .read(&request.path, ttl)
            .await
            .map_err(|e| {
                tracing::warn!(path = %request.path, "unable to read credentials: {}", e);
                BrokerError::BackendUnavailable(e)
            })?
            .ok_or_else(|| BrokerError::EmptyResponse(request.path.clone()))?;

        let duration = if secret.lease_duration.is_zero() {
            self.fallback_lease
        } else {
            secret.lease_duration
        };
        let expires_at = chrono::Duration::from_std(duration)
            .ok()
            .and_then(|d| Utc::now().checked_add_signed(d))
            .unwrap_or(chrono::DateTime::<Utc>::MAX_UTC);

        let response = IssueResponse {
            lease: Lease {
                id: secret.lease_id.clone(),
                duration,
                expires_at: Some(expires_at),
            },
            access_key: secret.string_field(ACCESS_KEY_FIELD),
            secret_key: secret.string_field(SECRET_KEY_FIELD),
        };

        tracing::info!(
            path = %request.path,
            lease_id = %response.lease.id,
            access_key = %mask(&response.access_key),
            expires_at = %expires_at.to_rfc3339(),
            "issued credentials"
        );

        Ok(response)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Mutex;

    /// In-memory backend recording the TTL hints it was asked for.
    #[derive(Default)]
    pub struct StaticBackend {
        pub secret: Option<BackendSecret>,
        pub fail: bool,
        pub seen_ttls: Mutex<Vec<Option<Duration>>>,
    }

    #[async_trait::async_trait]
    impl SecretsBackend for StaticBackend {
        async fn read(
            &self,
            _path: &str,
            ttl: Option<Duration>,
        ) -> Result<Option<BackendSecret>, BackendError> {
            self.seen_ttls.lock().unwrap().push(ttl);
            if self.fail {
                return Err(BackendError::NotConfigured("offline".into()));
            }
            Ok(self.secret.clone())
        }
    }

    pub fn minio_secret(lease_duration: Duration) -> BackendSecret {
        let mut data = serde_json::Map::new();
        data.insert(ACCESS_KEY_FIELD.into(), "AKIAEXAMPLE".into());
        data.insert(SECRET_KEY_FIELD.into(), "wJalrXUtnFEMI".into());
        BackendSecret {
            lease_id: "minio/keys/team/1".into(),
            lease_duration,
            data,
        }
    }

    fn broker_with(backend: StaticBackend) -> (Broker, Arc<StaticBackend>) {
        let backend = Arc::new(backend);
        (
            Broker::new(backend.clone(), Duration::from_secs(3600)),
            backend,
        )
    }

    #[tokio::test]
    async fn test_ttl_forwarding() {
        let (broker, backend) = broker_with(StaticBackend {
            secret: Some(minio_secret(Duration::from_secs(60))),
            ..Default::default()
        });

        broker
            .issue_credentials(IssueRequest::new("minio/keys/team", Duration::ZERO))
            .await
            .unwrap();
        broker
            .issue_credentials(IssueRequest::new("minio/keys/team", Duration::from_secs(90)))
            .await
            .unwrap();

        let seen = backend.seen_ttls.lock().unwrap().clone();
        assert_eq!(seen, vec![None, Some(Duration::from_secs(90))]);
    }

    #[tokio::test]
    async fn test_expiry_is_in_the_future() {
        let (broker, _) = broker_with(StaticBackend {
            secret: Some(minio_secret(Duration::from_secs(2))),
            ..Default::default()
        });
        let before = Utc::now();
        let response = broker
            .issue_credentials(IssueRequest::new("minio/keys/team", Duration::ZERO))
            .await
            .unwrap();
        assert!(response.lease.expires_at.unwrap() > before);
        assert_eq!(response.access_key, "AKIAEXAMPLE");
        assert_eq!(response.secret_key, "wJalrXUtnFEMI");
    }

    #[tokio::test]
    async fn test_zero_lease_uses_fallback() {
        let (broker, _) = broker_with(StaticBackend {
            secret: Some(minio_secret(Duration::ZERO)),
            ..Default::default()
        });
        let response = broker
            .issue_credentials(IssueRequest::new("kv/static", Duration::ZERO))
            .await
            .unwrap();
        assert_eq!(response.lease.duration, Duration::from_secs(3600));
        assert!(response.lease.expires_at.unwrap() > Utc::now());
    }

    #[tokio::test]
    async fn test_missing_fields_are_empty_not_errors() {
        let (broker, _) = broker_with(StaticBackend {
            secret: Some(BackendSecret {
                lease_id: "x".into(),
                lease_duration: Duration::from_secs(10),
                data: serde_json::Map::new(),
            }),
            ..Default::default()
        });
        let response = broker
            .issue_credentials(IssueRequest::new("minio/keys/other", Duration::ZERO))
            .await
            .unwrap();
        assert!(!response.has_credentials());
        assert!(response.secret_key.is_empty());
    }

    #[tokio::test]
    async fn test_backend_errors_are_distinguished() {
        let (broker, _) = broker_with(StaticBackend::default());
        let err = broker
            .issue_credentials(IssueRequest::new("minio/keys/none", Duration::ZERO))
            .await
            .unwrap_err();
        assert!(matches!(err, BrokerError::EmptyResponse(path) if path == "minio/keys/none"));

        let (broker, _) = broker_with(StaticBackend {
            fail: true,
            ..Default::default()
        });
        let err = broker
            .issue_credentials(IssueRequest::new("minio/keys/team", Duration::ZERO))
            .await
            .unwrap_err();
        assert!(matches!(err, BrokerError::BackendUnavailable(_)));
    }
}
