use std::time::Duration;

use serde_json::{Map, Value};

/// A secret as read from the backend, before the broker shapes it into
/// credentials.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BackendSecret {
    pub lease_id: String,
    pub lease_duration: Duration,
    pub data: Map<String, Value>,
}

impl BackendSecret {
    /// String value stored under `key`, or empty when absent or not a string.
    pub fn string_field(&self, key: &str) -> String {
        match self.data.get(key) {
            Some(Value::String(s)) => s.clone(),
            Some(other) => {
                tracing::warn!(key, kind = value_kind(other), "secret field is not a string");
                String::new()
            }
            None => String::new(),
        }
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Read access to the secrets backend.
///
/// Implementations are shared across concurrent broker requests and must
/// tolerate concurrent reads.
#[async_trait::async_trait]
pub trait SecretsBackend: Send + Sync {
    /// Read the secret at `path`, passing `ttl` as a lease hint when given.
    ///
    /// `Ok(None)` means the backend answered but returned no secret at all.
    async fn read(
        &self,
        path: &str,
        ttl: Option<Duration>,
    ) -> Result<Option<BackendSecret>, BackendError>;
}

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("backend request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("backend returned status {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("invalid backend url: {0}")]
    Url(#[from] url::ParseError),
    #[error("backend is not configured: {0}")]
    NotConfigured(String),
}
