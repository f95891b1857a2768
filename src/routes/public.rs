use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post},
};

/// Public Router Module
///
/// Endpoints reachable without a session. `/auth/signin` and `/auth/signup` are
/// anonymous-only: the access gate sends callers that already hold a session to the journal.
/// `/auth/signout` stays reachable for everyone so a stale flag can always be cleared.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // GET /health
        // Liveness probe for monitoring and load balancer checks.
        .route("/health", get(handlers::health))
        // POST /auth/signup
        // Forwards account creation to Supabase Auth.
        .route("/auth/signup", post(handlers::sign_up))
        // POST /auth/signin
        // Password grant; stores the access token in the session cookie.
        .route("/auth/signin", post(handlers::sign_in))
        // POST /auth/signout
        // Clears the session cookie and the admin_session flag.
        .route("/auth/signout", post(handlers::sign_out))
}
