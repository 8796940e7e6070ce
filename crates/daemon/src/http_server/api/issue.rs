use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::Json;
use bytes::Bytes;
use http::{Method, Request, StatusCode};

use common::lease::{mask, IssueRequest, IssueResponse};

use crate::broker::{Broker, BrokerError};
use crate::http_server::api::client::{json_request, ApiRequest, ClientError};
use crate::http_server::api::ISSUE_PATH;

/// Issue a credential lease for the requested secret path.
///
/// The body is decoded by hand so that a malformed request is answered
/// with a plain 400 instead of axum's rejection types.
pub async fn handler(
    State(broker): State<Broker>,
    body: Bytes,
) -> Result<impl IntoResponse, IssueError> {
    let request: IssueRequest =
        serde_json::from_slice(&body).map_err(|e| IssueError::MalformedRequest(e.to_string()))?;

    let response = broker.issue_credentials(request).await?;
    tracing::debug!(
        lease_id = %response.lease.id,
        access_key = %mask(&response.access_key),
        "returning issued lease"
    );

    Ok((StatusCode::OK, Json(response)).into_response())
}

#[derive(Debug, thiserror::Error)]
pub enum IssueError {
    #[error("malformed issue request: {0}")]
    MalformedRequest(String),
    #[error(transparent)]
    Broker(#[from] BrokerError),
}

impl IntoResponse for IssueError {
    fn into_response(self) -> Response {
        match self {
            IssueError::MalformedRequest(msg) => {
                tracing::warn!("rejecting issue request: {}", msg);
                (StatusCode::BAD_REQUEST, format!("malformed request: {}", msg)).into_response()
            }
            IssueError::Broker(e @ BrokerError::BackendUnavailable(_)) => {
                tracing::error!("issue failed: {}", e);
                (StatusCode::BAD_GATEWAY, e.to_string()).into_response()
            }
            IssueError::Broker(e @ BrokerError::EmptyResponse(_)) => {
                tracing::warn!("issue failed: {}", e);
                (StatusCode::NOT_FOUND, e.to_string()).into_response()
            }
        }
    }
}

impl ApiRequest for IssueRequest {
    type Response = IssueResponse;

    fn build_request(self) -> Result<Request<String>, ClientError> {
        json_request(Method::POST, ISSUE_PATH, &self)
    }
}
