//! API Router configuration

use super::handlers;
use super::state::AppState;
use crate::config::ServerConfig;
use axum::{
    routing::{delete, get, post, put},
    Router,
};
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

/// Create the main API router
pub fn create_router(state: AppState, config: &ServerConfig) -> Router {
    let router = Router::new()
        // Health
        .route("/health", get(handlers::health_check))
        // Administration
        .route("/events", post(handlers::create_event))
        .route("/events/:workflow_id", get(handlers::list_events))
        .route(
            "/events/:workflow_id/:event_id",
            delete(handlers::delete_event),
        )
        .route(
            "/events/:workflow_id/:event_id/reset",
            put(handlers::reset_event),
        )
        // Node protocol
        .route(
            "/events/:workflow_id/:event_id/executed",
            put(handlers::execute),
        )
        .route(
            "/events/:workflow_id/:event_id/executed/:sender_id",
            get(handlers::get_executed),
        )
        .route(
            "/events/:workflow_id/:event_id/included/:param",
            get(handlers::get_included).put(handlers::put_included),
        )
        .route(
            "/events/:workflow_id/:event_id/pending/:value",
            put(handlers::put_pending),
        )
        .route(
            "/events/:workflow_id/:event_id/state/:sender_id",
            get(handlers::get_state),
        )
        .route("/events/:workflow_id/:event_id/lock", post(handlers::lock))
        .route(
            "/events/:workflow_id/:event_id/lock/:sender_id",
            delete(handlers::unlock),
        )
        .with_state(state)
        .layer(TimeoutLayer::new(Duration::from_secs(
            config.request_timeout_secs,
        )))
        .layer(TraceLayer::new_for_http());

    if config.enable_cors {
        router.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
    } else {
        router
    }
}
