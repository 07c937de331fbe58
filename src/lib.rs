pub mod auth;
pub mod config;
pub mod database;
pub mod errors;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod storage;
pub mod utils;

use axum::{
    extract::DefaultBodyLimit,
    routing::{delete, get, post},
    Router,
};

pub use handlers::AppState;

/// Multipart framing on top of the largest accepted file.
const MULTIPART_OVERHEAD_BYTES: u64 = 1024 * 1024;

pub fn create_app(state: AppState) -> Router {
    let body_limit = state
        .config
        .store
        .max_single_upload_bytes
        .saturating_add(MULTIPART_OVERHEAD_BYTES)
        .min(usize::MAX as u64) as usize;

    let auth_routes = Router::new()
        .route("/register", post(handlers::auth::register))
        .route("/login", post(handlers::auth::login))
        .route("/logout", post(handlers::auth::logout));

    let file_routes = Router::new()
        .route(
            "/",
            get(handlers::files::list_files).post(handlers::files::upload_file),
        )
        .route("/reconcile", post(handlers::files::reconcile_files))
        .route("/id/:id", delete(handlers::files::delete_file_by_id))
        .route(
            "/:name",
            get(handlers::files::download_file).delete(handlers::files::delete_file),
        )
        .layer(DefaultBodyLimit::max(body_limit));

    Router::new()
        .route("/health", get(handlers::health::health_check))
        .nest("/api/v1/auth", auth_routes)
        .nest("/api/v1/files", file_routes)
        .route("/api/v1/usage", get(handlers::user::get_usage))
        .with_state(state)
}
