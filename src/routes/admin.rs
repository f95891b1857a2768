use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post, put},
};

/// Admin Router Module
///
/// Nested under `/admin`. The access gate redirects non-admins to `/admin/login` before these
/// handlers run, and each handler also takes an `AdminUser`, which answers 403 when a request
/// gets through without the role (for instance on the loop-prevention marker).
///
/// `/admin/login` is the exception: it is open to everyone, and admins who already hold a
/// session are forwarded to the dashboard.
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        // GET/POST /admin/login
        // Sign-in page and password grant restricted to admins. A successful POST sets the
        // signed admin_session flag next to the session cookie.
        .route(
            "/login",
            get(handlers::admin_login_page).post(handlers::admin_login),
        )
        // GET /admin/dashboard
        .route("/dashboard", get(handlers::get_dashboard))
        // GET/POST /admin/prompts
        .route(
            "/prompts",
            get(handlers::list_prompts).post(handlers::create_prompt),
        )
        // PUT/DELETE /admin/prompts/{id}
        .route(
            "/prompts/{id}",
            put(handlers::update_prompt).delete(handlers::delete_prompt),
        )
        // POST /admin/prompts/{id}/activate
        // Exactly one template is active after this returns.
        .route("/prompts/{id}/activate", post(handlers::activate_prompt))
}
