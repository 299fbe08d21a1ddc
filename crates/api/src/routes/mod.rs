//! API routes

pub mod health;
pub mod messages;
pub mod sessions;

use axum::{
    extract::DefaultBodyLimit,
    http::HeaderValue,
    middleware,
    routing::{get, patch, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::{
    auth::{optional_auth, require_admin},
    state::AppState,
    websocket::ws_handler,
};

/// Headroom for JSON framing around a base64 attachment
const BODY_OVERHEAD_BYTES: usize = 64 * 1024;

fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() {
        return CorsLayer::permissive();
    }
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %o, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(Any)
        .allow_headers(Any)
}

/// Create all API routes
pub fn create_router(state: AppState) -> Router {
    // Health check routes (at root level for infrastructure monitoring)
    let health_routes = Router::new()
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness));

    // Customer-facing routes: anonymous allowed, a bad token is still rejected
    let chat_routes = Router::new()
        .route(
            "/chat/sessions",
            post(sessions::start_session).get(sessions::list_sessions),
        )
        .route(
            "/chat/sessions/:chat_id",
            get(sessions::get_session).patch(sessions::update_session),
        )
        .route("/chat/sessions/:chat_id/identity", patch(sessions::upgrade_identity))
        .route("/chat/sessions/:chat_id/read", post(sessions::mark_read))
        .route(
            "/chat/sessions/:chat_id/messages",
            get(messages::list_messages).post(messages::send_message),
        )
        .route("/chat/attachments/:attachment_id", get(messages::get_attachment))
        .layer(middleware::from_fn_with_state(state.clone(), optional_auth));

    // Admin console actions
    let admin_routes = Router::new()
        .route("/chat/sessions/:chat_id/assign", post(sessions::assign_session))
        .route("/chat/sessions/:chat_id/close", post(sessions::close_session))
        .route("/chat/sessions/:chat_id/archive", post(sessions::archive_session))
        .layer(middleware::from_fn_with_state(state.clone(), require_admin));

    // WebSocket route (auth handled in handler via query parameter)
    let websocket_routes = Router::new().route("/ws/chat", get(ws_handler));

    let api_v1_routes = Router::new()
        .merge(chat_routes)
        .merge(admin_routes)
        .merge(websocket_routes);

    let body_limit = (state.config.max_attachment_bytes + 2) / 3 * 4 + BODY_OVERHEAD_BYTES;

    Router::new()
        .merge(health_routes)
        .nest("/api/v1", api_v1_routes)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors_layer(&state.config.cors_allowed_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
