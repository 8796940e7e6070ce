//! Credential leases and broker wire types.
//!
//! The broker speaks JSON over its local socket. Durations travel as integer
//! nanoseconds so the wire format matches the original driver's encoding of
//! `time.Duration`; negative values decode as zero ("use backend default").

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Serde adapter encoding a [`Duration`] as signed integer nanoseconds.
pub mod duration_nanos {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        let nanos = i64::try_from(value.as_nanos()).unwrap_or(i64::MAX);
        serializer.serialize_i64(nanos)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let nanos = i64::deserialize(deserializer)?;
        Ok(Duration::from_nanos(nanos.max(0) as u64))
    }
}

/// A request for credentials at a secrets-backend path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueRequest {
    /// Backend path the credentials are read from
    pub path: String,
    /// Requested lease TTL; zero asks for the backend default
    #[serde(with = "duration_nanos", default)]
    pub ttl: Duration,
}

impl IssueRequest {
    pub fn new(path: impl Into<String>, ttl: Duration) -> Self {
        Self {
            path: path.into(),
            ttl,
        }
    }

    /// The TTL to forward to the backend, if one was asked for.
    pub fn ttl_hint(&self) -> Option<Duration> {
        (!self.ttl.is_zero()).then_some(self.ttl)
    }
}

/// Lease metadata as returned by the broker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lease {
    pub id: String,
    #[serde(with = "duration_nanos")]
    pub duration: Duration,
    /// Absolute expiry computed by the broker. Older brokers omit it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl Lease {
    /// Expiry of this lease for a response received at `received_at`.
    pub fn expiry(&self, received_at: DateTime<Utc>) -> DateTime<Utc> {
        if let Some(expires_at) = self.expires_at {
            return expires_at;
        }
        let duration = chrono::Duration::from_std(self.duration).unwrap_or(chrono::Duration::MAX);
        received_at
            .checked_add_signed(duration)
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueResponse {
    pub lease: Lease,
    pub access_key: String,
    pub secret_key: String,
}

impl IssueResponse {
    /// An empty access key means the backend produced nothing usable.
    pub fn has_credentials(&self) -> bool {
        !self.access_key.is_empty()
    }

    pub fn into_credential_lease(self, received_at: DateTime<Utc>) -> CredentialLease {
        CredentialLease {
            expiry: self.lease.expiry(received_at),
            lease_id: self.lease.id,
            access_key: self.access_key,
            secret_key: self.secret_key,
        }
    }
}

impl fmt::Debug for IssueResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IssueResponse")
            .field("lease", &self.lease)
            .field("access_key", &mask(&self.access_key))
            .field("secret_key", &"<redacted>")
            .finish()
    }
}

/// A credential together with the instant after which it is no longer
/// guaranteed valid. Never mutated; renewal produces a new lease.
#[derive(Clone, PartialEq, Eq)]
pub struct CredentialLease {
    pub lease_id: String,
    pub access_key: String,
    pub secret_key: String,
    pub expiry: DateTime<Utc>,
}

impl CredentialLease {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expiry <= now
    }

    /// Time left before expiry, saturating at zero.
    pub fn remaining(&self, now: DateTime<Utc>) -> Duration {
        (self.expiry - now).to_std().unwrap_or(Duration::ZERO)
    }

    /// Access key identifier safe to put in logs.
    pub fn masked_access_key(&self) -> String {
        mask(&self.access_key)
    }
}

impl fmt::Debug for CredentialLease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialLease")
            .field("lease_id", &self.lease_id)
            .field("access_key", &self.masked_access_key())
            .field("secret_key", &"<redacted>")
            .field("expiry", &self.expiry)
            .finish()
    }
}

/// Keep the first four characters of an identifier and hide the rest.
pub fn mask(value: &str) -> String {
    if value.is_empty() {
        return String::new();
    }
    let visible: String = value.chars().take(4).collect();
    format!("{}****", visible)
}
