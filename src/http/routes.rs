use super::handlers;
use super::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Create the HTTP router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Interview control
        .route("/interviews/start", post(handlers::start_interview))
        .route("/interviews/:interview_id/end", post(handlers::end_interview))
        .route("/interviews/:interview_id/mute", post(handlers::set_mute))
        // Live preview
        .route(
            "/interviews/:interview_id/status",
            get(handlers::get_interview_status),
        )
        .route(
            "/interviews/:interview_id/transcript",
            get(handlers::get_interview_transcript),
        )
        // Add tracing middleware for request logging
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
