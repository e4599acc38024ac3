//! Admin route definitions.

use axum::{
    Router,
    routing::{get, post, put},
};
use tower_http::trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::Level;

use super::handlers;
use super::state::AppState;

/// Create the admin router.
pub fn create_router(state: AppState) -> Router {
    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_request(DefaultOnRequest::new().level(Level::DEBUG))
        .on_response(DefaultOnResponse::new().level(Level::INFO));

    Router::new()
        .route("/health", get(handlers::health))
        .route("/applications", get(handlers::list_applications))
        .route("/applications/lifecycle", get(handlers::lifecycle_stream))
        .route(
            "/applications/{application_id}/launch",
            post(handlers::launch_application),
        )
        .route(
            "/applications/{application_id}/stop",
            post(handlers::stop_application),
        )
        .route(
            "/applications/{application_id}/log",
            get(handlers::application_log),
        )
        .route(
            "/applications/{application_id}/pages/{page_id}",
            put(handlers::publish_page).delete(handlers::unpublish_page),
        )
        .route(
            "/applications/{application_id}/events",
            post(handlers::emit_event),
        )
        .layer(trace_layer)
        .with_state(state)
}
