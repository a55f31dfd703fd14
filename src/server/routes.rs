//! Router assembly.

use super::{auth, handlers, AppState};
use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

/// Build the service router.
///
/// Only `/process` sits behind the API-key check; `/health` stays open for
/// container probes.
pub fn create_router(state: AppState) -> Router {
    let body_limit = state.extractor.config().max_body_bytes;

    let protected = Router::new()
        .route("/process", post(handlers::process_receipt))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_api_key,
        ));

    Router::new()
        .route("/health", get(handlers::health))
        .merge(protected)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
