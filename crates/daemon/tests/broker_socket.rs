//! End-to-end: broker client → unix socket → broker → mocked secrets backend.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use http::StatusCode;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use url::Url;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use berth_daemon::broker::{Broker, VaultBackend, VaultConfig};
use berth_daemon::http_server::api::client::BrokerClient;
use berth_daemon::http_server::{self, Config, HttpServerError};
use berth_daemon::{start_agent, ServiceConfig};
use common::lease::IssueRequest;

struct RunningBroker {
    client: BrokerClient,
    shutdown_tx: watch::Sender<bool>,
    handle: JoinHandle<Result<(), HttpServerError>>,
}

fn start_broker(vault: &MockServer, dir: &Path) -> RunningBroker {
    let backend = VaultBackend::new(VaultConfig {
        address: Url::parse(&vault.uri()).unwrap(),
        token: Some("node-token".into()),
        namespace: None,
        timeout: Duration::from_secs(5),
    })
    .unwrap();
    let broker = Broker::new(Arc::new(backend), Duration::from_secs(3600));

    let socket_path = dir.join("broker.sock");
    let config = Config::new(socket_path.clone());
    let listener = http_server::bind_socket(&config).unwrap();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(http_server::serve(listener, config, broker, shutdown_rx));

    RunningBroker {
        client: BrokerClient::new(socket_path).with_timeout(Duration::from_secs(5)),
        shutdown_tx,
        handle,
    }
}

fn minio_reply(lease_duration: u64) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(serde_json::json!({
        "lease_id": "minio/keys/team/7f3a",
        "lease_duration": lease_duration,
        "renewable": true,
        "data": {"accessKeyId": "AKIAEXAMPLE7", "secretAccessKey": "wJalrXUtnFEMI"}
    }))
}

#[tokio::test]
async fn test_issue_round_trip_over_socket() {
    let vault = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/minio/keys/team"))
        .and(query_param("ttl", "90s"))
        .and(header("X-Vault-Token", "node-token"))
        .respond_with(minio_reply(90))
        .expect(1)
        .mount(&vault)
        .await;

    let dir = tempfile::TempDir::new().unwrap();
    let broker = start_broker(&vault, dir.path());

    let before = Utc::now();
    let issued = broker
        .client
        .issue_credentials(IssueRequest::new("minio/keys/team", Duration::from_secs(90)))
        .await
        .unwrap();

    assert_eq!(issued.access_key, "AKIAEXAMPLE7");
    assert_eq!(issued.secret_key, "wJalrXUtnFEMI");
    assert_eq!(issued.lease.id, "minio/keys/team/7f3a");
    assert_eq!(issued.lease.duration, Duration::from_secs(90));

    let lease = issued.into_credential_lease(Utc::now());
    assert!(lease.expiry > before);

    broker.shutdown_tx.send_replace(true);
    broker.handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_backend_default_ttl_sends_no_hint() {
    let vault = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/minio/keys/team"))
        .respond_with(minio_reply(0))
        .expect(1)
        .mount(&vault)
        .await;

    let dir = tempfile::TempDir::new().unwrap();
    let broker = start_broker(&vault, dir.path());

    let issued = broker
        .client
        .issue_credentials(IssueRequest::new("minio/keys/team", Duration::ZERO))
        .await
        .unwrap();
    // non-leased secrets get the broker's fallback lease
    assert_eq!(issued.lease.duration, Duration::from_secs(3600));

    let requests = vault.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    assert!(requests[0].url.query().is_none());
}

#[tokio::test]
async fn test_backend_errors_surface_as_protocol_errors() {
    let vault = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/minio/keys/missing"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&vault)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/minio/keys/forbidden"))
        .respond_with(ResponseTemplate::new(403).set_body_string("permission denied"))
        .mount(&vault)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/minio/keys/revoked"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"data": null})))
        .mount(&vault)
        .await;

    let dir = tempfile::TempDir::new().unwrap();
    let broker = start_broker(&vault, dir.path());

    let err = broker
        .client
        .issue_credentials(IssueRequest::new("minio/keys/missing", Duration::ZERO))
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(StatusCode::NOT_FOUND));

    let err = broker
        .client
        .issue_credentials(IssueRequest::new("minio/keys/forbidden", Duration::ZERO))
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(StatusCode::BAD_GATEWAY));
    assert!(!err.is_transport());

    let err = broker
        .client
        .issue_credentials(IssueRequest::new("minio/keys/revoked", Duration::ZERO))
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(StatusCode::NOT_FOUND));
}

#[tokio::test]
async fn test_shutdown_removes_socket() {
    let vault = MockServer::start().await;
    let dir = tempfile::TempDir::new().unwrap();
    let broker = start_broker(&vault, dir.path());

    let livez = broker.client.livez().await.unwrap();
    assert_eq!(livez.status, "ok");

    broker.shutdown_tx.send_replace(true);
    broker.handle.await.unwrap().unwrap();
    assert!(!broker.client.socket_path().exists());

    let err = broker.client.livez().await.unwrap_err();
    assert!(err.is_transport());
}

#[tokio::test]
async fn test_agent_serves_until_shutdown() {
    let vault = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/minio/keys/team"))
        .respond_with(minio_reply(120))
        .expect(1)
        .mount(&vault)
        .await;

    let dir = tempfile::TempDir::new().unwrap();
    let socket_path = dir.path().join("run").join("agent.sock");
    let config = ServiceConfig {
        socket_path: socket_path.clone(),
        vault: VaultConfig {
            address: Url::parse(&vault.uri()).unwrap(),
            token: Some("node-token".into()),
            namespace: None,
            timeout: Duration::from_secs(5),
        },
        fallback_lease: Duration::from_secs(3600),
        log_level: tracing::Level::INFO,
        log_dir: None,
    };

    let agent = start_agent(&config).await.unwrap();
    let client = BrokerClient::new(socket_path.clone()).with_timeout(Duration::from_secs(5));

    let issued = client
        .issue_credentials(IssueRequest::new("minio/keys/team", Duration::ZERO))
        .await
        .unwrap();
    assert_eq!(issued.lease.duration, Duration::from_secs(120));

    agent.shutdown();
    tokio::time::timeout(Duration::from_secs(5), agent.wait())
        .await
        .unwrap()
        .unwrap();
    assert!(!socket_path.exists());
}
