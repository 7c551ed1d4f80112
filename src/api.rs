pub(crate) mod health;
pub(crate) mod metrics;
pub(crate) mod requests;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

use crate::app::AppState;

pub(crate) fn router(state: AppState) -> Router {
    Router::new()
        .route("/health/ready", get(health::ready))
        .route("/health/live", get(health::live))
        .route("/metrics", get(metrics::exporter))
        .route("/v1/requests", post(requests::enqueue))
        .route("/v1/requests/{id}", get(requests::fetch))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
