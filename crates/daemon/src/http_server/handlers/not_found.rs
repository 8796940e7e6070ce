use axum::http::{Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Json;

pub async fn not_found_handler(method: Method, uri: Uri) -> Response {
    tracing::debug!(%method, %uri, "no broker route");
    let err_msg = serde_json::json!({"msg": "not found"});
    (StatusCode::NOT_FOUND, Json(err_msg)).into_response()
}
