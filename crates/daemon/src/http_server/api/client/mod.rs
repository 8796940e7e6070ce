mod error;

use std::path::{Path, PathBuf};
use std::time::Duration;

use http::header::{CONTENT_TYPE, HOST};
use http::{Method, Request};
use http_body_util::BodyExt;
use hyper_util::rt::TokioIo;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::net::UnixStream;

use common::lease::{IssueRequest, IssueResponse};

pub use error::{ClientError, ProtocolError, TransportError};

use crate::http_server::health::liveness::{LivezRequest, LivezResponse};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// A request the broker understands, paired with its response type.
pub trait ApiRequest {
    type Response: DeserializeOwned;

    fn build_request(self) -> Result<Request<String>, ClientError>;
}

pub(crate) fn empty_request(method: Method, path: &str) -> Result<Request<String>, ClientError> {
    Ok(Request::builder()
        .method(method)
        .uri(path)
        .header(HOST, "localhost")
        .body(String::new())?)
}

pub(crate) fn json_request<T: Serialize>(
    method: Method,
    path: &str,
    body: &T,
) -> Result<Request<String>, ClientError> {
    let body = serde_json::to_string(body).map_err(ProtocolError::Encode)?;
    Ok(Request::builder()
        .method(method)
        .uri(path)
        .header(HOST, "localhost")
        .header(CONTENT_TYPE, "application/json")
        .body(body)?)
}

/// Client for the broker's local socket.
///
/// Every call dials a fresh connection and performs exactly one exchange.
/// Failures are returned as-is; retrying is the caller's business.
#[derive(Debug, Clone)]
pub struct BrokerClient {
    socket_path: PathBuf,
    timeout: Duration,
}

impl BrokerClient {
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: socket_path.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    pub async fn call<T: ApiRequest>(&self, request: T) -> Result<T::Response, ClientError> {
        let request = request.build_request()?;
        tokio::time::timeout(self.timeout, self.exchange::<T::Response>(request))
            .await
            .map_err(|_| TransportError::Timeout(self.timeout))?
    }

    async fn exchange<R: DeserializeOwned>(&self, request: Request<String>) -> Result<R, ClientError> {
        let stream = UnixStream::connect(&self.socket_path)
            .await
            .map_err(|source| TransportError::Connect {
                path: self.socket_path.clone(),
                source,
            })?;

        let (mut sender, connection) =
            hyper::client::conn::http1::handshake(TokioIo::new(stream)).await?;
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::debug!("broker connection closed with error: {}", e);
            }
        });

        let response = sender.send_request(request).await?;
        let status = response.status();
        let body = response.into_body().collect().await?.to_bytes();

        if !status.is_success() {
            return Err(ProtocolError::Status {
                status,
                body: String::from_utf8_lossy(&body).into_owned(),
            }
            .into());
        }

        serde_json::from_slice(&body).map_err(|e| ProtocolError::Decode(e).into())
    }

    pub async fn issue_credentials(
        &self,
        request: IssueRequest,
    ) -> Result<IssueResponse, ClientError> {
        self.call(request).await
    }

    pub async fn livez(&self) -> Result<LivezResponse, ClientError> {
        self.call(LivezRequest).await
    }
}
