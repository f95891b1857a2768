use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post},
};

/// Authenticated Router Module
///
/// Routes for any caller with a valid session. Anonymous callers never reach these handlers:
/// the access gate redirects them to `/auth/signin?redirectedFrom=<path>`. The `AuthUser`
/// extractor in every handler is the second check and answers 401 on its own.
///
/// Journal entries are Owner-Only; ownership is enforced inside the repository queries.
pub fn authenticated_routes() -> Router<AppState> {
    Router::<AppState>::new()
        // GET /profile
        // Identity plus a fresh role lookup.
        .route("/profile", get(handlers::get_profile))
        // GET/POST /journal/entries
        .route(
            "/journal/entries",
            get(handlers::list_entries).post(handlers::create_entry),
        )
        // GET/PUT/DELETE /journal/entries/{id}
        .route(
            "/journal/entries/{id}",
            get(handlers::get_entry)
                .put(handlers::update_entry)
                .delete(handlers::delete_entry),
        )
        // POST /journal/entries/{id}/analysis
        // Runs the active prompt template through the LLM and stores the result.
        .route(
            "/journal/entries/{id}/analysis",
            post(handlers::analyze_entry),
        )
}
