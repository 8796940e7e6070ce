use axum::response::{IntoResponse, Response};
use axum::Json;
use http::{Method, Request, StatusCode};
use serde::{Deserialize, Serialize};

use crate::http_server::api::client::{ApiRequest, ClientError};

/// Liveness probe. Answering at all is the signal; the backend is not
/// contacted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LivezRequest;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LivezResponse {
    pub status: String,
}

#[tracing::instrument]
pub async fn handler() -> Response {
    (
        StatusCode::OK,
        Json(LivezResponse {
            status: "ok".to_string(),
        }),
    )
        .into_response()
}

impl ApiRequest for LivezRequest {
    type Response = LivezResponse;

    fn build_request(self) -> Result<Request<String>, ClientError> {
        crate::http_server::api::client::empty_request(Method::GET, "/_status/livez")
    }
}
