use axum::routing::get;
use axum::Router;

pub mod liveness;

use crate::broker::Broker;

pub fn router(state: Broker) -> Router<Broker> {
    Router::new()
        .route("/livez", get(liveness::handler))
        .with_state(state)
}
