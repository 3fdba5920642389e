//! API route handlers.

pub mod auth;
pub mod user;

use crate::auth::middleware::AppState;
use axum::{routing::get, routing::post, Router};

/// Build the API router with all endpoints.
pub fn api_router() -> Router<AppState> {
    Router::new()
        .route("/challenge/{address}", get(auth::request_challenge))
        .route("/auth", post(auth::authenticate))
        .route("/register-ip", post(auth::register_ip))
        .route("/userinfo", get(user::userinfo))
        .route(
            "/settings/session-duration",
            post(user::set_session_duration),
        )
        .route("/stats/users", get(user::user_stats))
}
