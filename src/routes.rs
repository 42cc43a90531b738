// routes.rs
use std::sync::Arc;
use std::time::Duration;

use axum::{
    http::{header::CONTENT_TYPE, HeaderValue, Method},
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::warn;

use crate::handlers;
use crate::services::PollService;
use crate::store::VoteStore;

pub fn create_routes<S: VoteStore>(service: Arc<PollService<S>>) -> Router {
    Router::new()
        .route(
            "/api/polls",
            post(handlers::create_poll::<S>).get(handlers::get_poll::<S>),
        )
        .route("/api/polls/vote", post(handlers::vote::<S>))
        .route("/api/polls/results", get(handlers::get_results::<S>))
        .route("/health", get(handlers::health))
        .layer(TraceLayer::new_for_http())
        .with_state(service)
}

/// CORS for the poll frontend. Any origin unless one is configured.
pub fn cors_layer(allowed_origin: Option<&str>) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE])
        .max_age(Duration::from_secs(60 * 60));

    match allowed_origin.map(HeaderValue::from_str) {
        Some(Ok(origin)) => cors.allow_origin(origin),
        Some(Err(e)) => {
            warn!("Ignoring invalid CORS origin: {e}");
            cors.allow_origin(Any)
        }
        None => cors.allow_origin(Any),
    }
}
