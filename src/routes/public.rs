use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post},
};

/// Public Router Module
///
/// The account endpoints, mounted under `/api/v1`. Nothing here needs a session;
/// login is where one is created.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // POST /auth/register
        // Creates an account. The role is never taken from the request.
        .route("/auth/register", post(handlers::register_user))
        // POST /auth/login
        // Sets the `access_token` cookie and echoes the token in the body.
        .route("/auth/login", post(handlers::login))
        // GET /auth/logout
        // Clears the cookie.
        .route("/auth/logout", get(handlers::logout))
}

/// Liveness check for load balancers, served outside the versioned prefix.
pub fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(|| async { "ok" }))
}
