pub mod generation;
pub mod health;
pub mod session;

use axum::{
    routing::{get, post},
    Router,
};

use crate::middleware::rate_limit::{new_rps_state, rps_middleware};
use crate::AppState;

/// All HTTP routes with the per-second rate limit applied to the API.
pub fn router(state: AppState, rps: u32) -> Router {
    let api = Router::new()
        .route("/api/topics/:topic_id/batches", post(generation::generate_batch))
        .route("/api/topics/:topic_id/progress", get(generation::get_progress))
        .route("/api/topics/:topic_id/analysis", get(generation::get_analysis))
        .route("/api/topics/:topic_id/distribution", get(generation::get_distribution))
        .route("/api/topics/:topic_id/items", get(generation::list_items))
        .route("/api/sessions", post(session::create_session))
        .route(
            "/api/sessions/:id",
            get(session::get_session).delete(session::delete_session),
        )
        .route("/api/sessions/:id/reset", post(session::reset_session))
        .layer(axum::middleware::from_fn_with_state(
            new_rps_state(rps),
            rps_middleware,
        ));

    Router::new()
        .route("/health", get(health::health))
        .merge(api)
        .with_state(state)
}
