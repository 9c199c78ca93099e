//! Route definitions for the WHR Tracking Backend

use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};

use crate::{handlers, middleware::auth_middleware, AppState};

/// Create API routes. The state handle is needed up front so the auth
/// middleware validates tokens against the configured JWT secret.
pub fn api_routes(state: AppState) -> Router<AppState> {
    Router::new()
        // Health check (public)
        .route("/health", get(handlers::health_check))
        // Auth routes
        .nest("/auth", auth_routes(state.clone()))
        // Public tracking route (unauthenticated - for consignee lookups)
        .route("/tracking/:token", get(handlers::public_tracking))
        // Protected routes - warehouse operations
        .nest("/warehouse", warehouse_routes(state))
}

/// Authentication routes
fn auth_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/login", post(handlers::login))
        .route(
            "/me",
            get(handlers::me)
                .route_layer(middleware::from_fn_with_state(state, auth_middleware)),
        )
}

/// Warehouse receipt routes (protected)
fn warehouse_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/whr", get(handlers::list_whrs).post(handlers::create_whr))
        .route(
            "/whr/:whr_id",
            get(handlers::get_whr)
                .put(handlers::update_whr)
                .delete(handlers::delete_whr),
        )
        .route("/whr/:whr_id/classify", put(handlers::classify_whr))
        .route("/whr/:whr_id/email-sent", put(handlers::mark_email_sent))
        .route("/whr/:whr_id/email", post(handlers::send_email))
        .route("/whr/:whr_id/status", put(handlers::update_whr_status))
        .route("/stats", get(handlers::get_stats))
        .route("/search", get(handlers::search_whrs))
        .route("/export", get(handlers::export_whrs))
        .route_layer(middleware::from_fn_with_state(state, auth_middleware))
}
