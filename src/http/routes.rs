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
        // Session queries
        .route("/session", get(handlers::get_session))
        .route("/session/transcript", get(handlers::get_transcript))
        // UI intents
        .route("/session/login", post(handlers::login))
        .route("/session/mic", post(handlers::press_mic))
        .route("/session/text", post(handlers::submit_text))
        .route("/session/confirm", post(handlers::confirm))
        .route("/session/sos/request", post(handlers::sos_request))
        .route("/session/sos/confirm", post(handlers::sos_confirm))
        .route("/session/sos/cancel", post(handlers::sos_cancel))
        .route("/session/stop", post(handlers::emergency_stop))
        .route("/session/language", post(handlers::set_language))
        .route("/session/notice/dismiss", post(handlers::dismiss_notice))
        .route("/session/logout", post(handlers::logout))
        // The UI is served from a local webview origin
        .layer(CorsLayer::permissive())
        // Add tracing middleware for request logging
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
