// src/routes.rs

use axum::{
    Router, http::Method, middleware,
    routing::{get, post},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    handlers::{admin, leaderboard, stats},
    state::AppState,
    utils::jwt::{admin_middleware, auth_middleware},
};

/// Assembles the main application router.
///
/// * Public: leaderboard.
/// * Authenticated: progress recording, own stats, answer cache.
/// * Admin: reconciliation jobs and point awards.
pub fn create_router(state: AppState) -> Router {
    let origins = [
        "http://localhost:3000".parse().unwrap(),
        "http://127.0.0.1:3000".parse().unwrap(),
    ];

    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
        ]);

    let stats_routes = Router::new()
        .route("/leaderboard", get(leaderboard::get_leaderboard))
        // Protected stats routes
        .merge(
            Router::new()
                .route("/progress", post(stats::record_progress))
                .route("/me", get(stats::get_my_stats))
                .route("/answers", get(stats::list_answers))
                .layer(middleware::from_fn_with_state(
                    state.clone(),
                    auth_middleware,
                )),
        );

    let admin_routes = Router::new()
        .route("/reconcile", post(admin::reconcile))
        .route("/reconcile/points", post(admin::recalculate_points))
        .route("/reconcile/modules", post(admin::dedup_modules))
        .route("/awards", post(admin::award_points))
        // Double middleware protection: Auth first, then Admin check
        .layer(middleware::from_fn(admin_middleware))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    Router::new()
        .nest("/api/stats", stats_routes)
        .nest("/api/admin", admin_routes)
        // Global Middleware (applied from outside in)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
