use axum::routing::post;
use axum::Router;

pub mod client;
pub mod issue;

use crate::broker::Broker;

pub const ISSUE_PATH: &str = "/issue";

pub fn router(state: Broker) -> Router<Broker> {
    Router::new()
        .route(ISSUE_PATH, post(issue::handler))
        .with_state(state)
}
