//! Vault-compatible HTTP secrets backend.

use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{Map, Value};
use url::Url;

use super::backend::{BackendError, BackendSecret, SecretsBackend};

const TOKEN_HEADER: &str = "X-Vault-Token";
const NAMESPACE_HEADER: &str = "X-Vault-Namespace";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct VaultConfig {
    pub address: Url,
    pub token: Option<String>,
    pub namespace: Option<String>,
    pub timeout: Duration,
}

impl VaultConfig {
    /// Build from the usual `VAULT_*` environment variables, falling back to
    /// the values from the config file.
    pub fn from_env(
        addr: Option<&str>,
        namespace: Option<&str>,
        timeout: Option<Duration>,
    ) -> Result<Self, BackendError> {
        let address = std::env::var("VAULT_ADDR")
            .ok()
            .filter(|v| !v.is_empty())
            .or_else(|| addr.map(str::to_string))
            .ok_or_else(|| BackendError::NotConfigured("VAULT_ADDR is not set".to_string()))?;
        let token = std::env::var("VAULT_TOKEN").ok().filter(|v| !v.is_empty());
        let namespace = std::env::var("VAULT_NAMESPACE")
            .ok()
            .filter(|v| !v.is_empty())
            .or_else(|| namespace.map(str::to_string));

        Ok(Self {
            address: Url::parse(&address)?,
            token,
            namespace,
            timeout: timeout.unwrap_or(DEFAULT_TIMEOUT),
        })
    }
}

/// Logical read response envelope.
#[derive(Debug, Deserialize)]
struct SecretEnvelope {
    #[serde(default)]
    lease_id: String,
    #[serde(default)]
    lease_duration: u64,
    #[serde(default)]
    data: Option<Map<String, Value>>,
}

#[derive(Debug, Clone)]
pub struct VaultBackend {
    client: Client,
    config: VaultConfig,
}

impl VaultBackend {
    pub fn new(config: VaultConfig) -> Result<Self, BackendError> {
        let client = Client::builder().timeout(config.timeout).build()?;
        if config.token.is_none() {
            tracing::warn!("no VAULT_TOKEN set, backend requests will be unauthenticated");
        }
        Ok(Self { client, config })
    }

    fn secret_url(&self, path: &str, ttl: Option<Duration>) -> Result<Url, BackendError> {
        let mut url = self
            .config
            .address
            .join(&format!("v1/{}", path.trim_start_matches('/')))?;
        if let Some(ttl) = ttl {
            url.query_pairs_mut()
                .append_pair("ttl", &format!("{}s", ttl.as_secs().max(1)));
        }
        Ok(url)
    }
}

#[async_trait::async_trait]
impl SecretsBackend for VaultBackend {
    async fn read(
        &self,
        path: &str,
        ttl: Option<Duration>,
    ) -> Result<Option<BackendSecret>, BackendError> {
        let url = self.secret_url(path, ttl)?;

        let mut request = self.client.get(url);
        if let Some(token) = &self.config.token {
            request = request.header(TOKEN_HEADER, token);
        }
        if let Some(namespace) = &self.config.namespace {
            request = request.header(NAMESPACE_HEADER, namespace);
        }

        let response = request.send().await?;
        match response.status() {
            StatusCode::NOT_FOUND | StatusCode::NO_CONTENT => return Ok(None),
            status if !status.is_success() => {
                return Err(BackendError::Status {
                    status,
                    body: response.text().await.unwrap_or_default(),
                })
            }
            _ => {}
        }

        // a null body or null data carries no secret
        let envelope: Option<SecretEnvelope> = response.json().await?;
        Ok(envelope.and_then(|secret| {
            secret.data.map(|data| BackendSecret {
                lease_id: secret.lease_id,
                lease_duration: Duration::from_secs(secret.lease_duration),
                data,
            })
        }))
    }
}
