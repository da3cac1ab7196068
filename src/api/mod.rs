//! API module for handling HTTP requests and responses

pub(crate) mod handlers;
pub(crate) mod responses;

use axum::{
    extract::{DefaultBodyLimit, State},
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    limit::RequestBodyLimitLayer,
    trace::TraceLayer,
};

use crate::{built_info, checker::USAGE_TIP, state::AppState};

use handlers::*;
use responses::{ApiResponse, HealthReport};

/// Create the application router with all routes
pub fn create_router(state: Arc<AppState>) -> Router {
    // Configure CORS
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let max_upload_size = state.config.max_upload_size;

    Router::new()
        .route("/api/health", get(health_check))
        .route("/api/sessions", post(create_session))
        .route("/api/sessions/:id", get(get_session).delete(delete_session))
        .route("/api/sessions/:id/references/:class", post(add_references))
        .route("/api/sessions/:id/check", post(check_image))
        .route("/api/sessions/:id/reset", post(reset_session))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(max_upload_size))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Health check endpoint
pub async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ApiResponse::success(HealthReport {
        status: "ok",
        version: built_info::PKG_VERSION,
        built: built_info::BUILT_TIME_UTC,
        model: state.model_status().await,
        sessions: state.session_count().await,
        tip: USAGE_TIP,
    })
}
