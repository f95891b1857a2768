use crate::{
    AppState,
    access::{self, AccessGate},
    auth::{self, AdminUser, AuthUser, Identity},
    error::ApiError,
    models::{
        AdminDashboardStats, AdminLoginPage, CreateJournalEntryRequest,
        CreatePromptTemplateRequest, ENTRY_PLACEHOLDER, JournalEntry, PromptTemplate, Role,
        SignInRequest, SignUpRequest, UpdateJournalEntryRequest, UpdatePromptTemplateRequest,
        UserProfile,
    },
    session_flag,
};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::{CookieJar, SignedCookieJar};
use serde::Deserialize;
use uuid::Uuid;

// --- Query Structs ---

/// RedirectQuery
///
/// The `redirectedFrom` parameter the access gate appends when it sends a caller to a
/// sign-in page.
#[derive(Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct RedirectQuery {
    /// Originally requested path.
    #[serde(rename = "redirectedFrom")]
    pub redirected_from: Option<String>,
}

// --- Handlers ---

/// health
///
/// [Public Route] Liveness probe for load balancers.
#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Service is up", body = String))
)]
pub async fn health() -> &'static str {
    "ok"
}

/// sign_up
///
/// [Anonymous Route] Creates an account through Supabase Auth. No role row is written: a new
/// account starts as `Role::None` until an administrator grants one.
#[utoipa::path(
    post,
    path = "/auth/signup",
    request_body = SignUpRequest,
    responses(
        (status = 201, description = "Account created", body = UserProfile),
        (status = 400, description = "Invalid payload"),
        (status = 401, description = "Rejected by the auth provider")
    )
)]
pub async fn sign_up(
    State(state): State<AppState>,
    Json(payload): Json<SignUpRequest>,
) -> Result<(StatusCode, Json<UserProfile>), ApiError> {
    validate_credentials(&payload.email, &payload.password)?;

    let id = state
        .auth_provider
        .sign_up(&payload.email, &payload.password)
        .await?;

    tracing::info!(user_id = %id, "account created");

    Ok((
        StatusCode::CREATED,
        Json(UserProfile {
            id,
            email: payload.email,
            role: Role::None,
        }),
    ))
}

/// sign_in
///
/// [Anonymous Route] Password grant against Supabase Auth. On success the access token is stored
/// in the http-only session cookie and the caller is sent to `redirectedFrom` (local paths only)
/// or to the journal. Any `admin_session` flag left in the browser belongs to an earlier session
/// and is dropped.
#[utoipa::path(
    post,
    path = "/auth/signin",
    request_body = SignInRequest,
    responses(
        (status = 303, description = "Signed in, redirecting"),
        (status = 401, description = "Invalid credentials")
    )
)]
pub async fn sign_in(
    State(state): State<AppState>,
    jar: CookieJar,
    signed: SignedCookieJar,
    Json(payload): Json<SignInRequest>,
) -> Result<(CookieJar, SignedCookieJar, Redirect), ApiError> {
    validate_credentials(&payload.email, &payload.password)?;

    let tokens = state
        .auth_provider
        .sign_in_with_password(&payload.email, &payload.password)
        .await?;

    let target = access::local_redirect_target(
        payload.redirected_from.as_deref(),
        access::USER_LANDING_PATH,
    );

    tracing::info!(user_id = %tokens.user_id, target = %target, "signed in");

    let jar = jar.add(auth::session_cookie(
        &state.config,
        tokens.access_token,
        tokens.expires_in,
    ));
    let signed = session_flag::clear_flag(signed);
    Ok((jar, signed, Redirect::to(&target)))
}

/// sign_out
///
/// [Public Route] Drops the session cookie and the `admin_session` flag.
#[utoipa::path(
    post,
    path = "/auth/signout",
    responses((status = 303, description = "Signed out, redirecting to sign-in"))
)]
pub async fn sign_out(
    State(state): State<AppState>,
    jar: CookieJar,
    signed: SignedCookieJar,
) -> impl IntoResponse {
    let jar = jar.add(auth::clear_session_cookie(&state.config));
    let signed = session_flag::clear_flag(signed);
    (jar, signed, Redirect::to(access::SIGN_IN_PATH))
}

/// get_profile
///
/// [Authenticated Route] The caller's identity and current role. The role is always a fresh
/// lookup; the admin flag is not consulted here.
#[utoipa::path(
    get,
    path = "/profile",
    responses(
        (status = 200, description = "Profile", body = UserProfile),
        (status = 503, description = "Role store unavailable")
    )
)]
pub async fn get_profile(
    AuthUser { id, email }: AuthUser,
    State(gate): State<AccessGate>,
) -> Result<Json<UserProfile>, ApiError> {
    let identity = Identity { id, email };
    let role = gate.lookup_role(&identity).await?;

    Ok(Json(UserProfile {
        id: identity.id,
        email: identity.email,
        role,
    }))
}

/// list_entries
///
/// [Authenticated Route] The caller's own journal entries, newest first.
#[utoipa::path(
    get,
    path = "/journal/entries",
    responses((status = 200, description = "My entries", body = [JournalEntry]))
)]
pub async fn list_entries(
    AuthUser { id, .. }: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<JournalEntry>>, ApiError> {
    Ok(Json(state.repo.list_entries(id).await?))
}

/// create_entry
///
/// [Authenticated Route] Writes a new entry owned by the caller.
#[utoipa::path(
    post,
    path = "/journal/entries",
    request_body = CreateJournalEntryRequest,
    responses(
        (status = 201, description = "Created", body = JournalEntry),
        (status = 400, description = "Empty title or content")
    )
)]
pub async fn create_entry(
    AuthUser { id, .. }: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<CreateJournalEntryRequest>,
) -> Result<(StatusCode, Json<JournalEntry>), ApiError> {
    if payload.title.trim().is_empty() || payload.content.trim().is_empty() {
        return Err(ApiError::BadRequest(
            "title and content must not be empty".into(),
        ));
    }

    let entry = state.repo.create_entry(id, payload).await?;
    Ok((StatusCode::CREATED, Json(entry)))
}

/// get_entry
///
/// [Authenticated Route] A single entry. Entries of other users are reported as missing.
#[utoipa::path(
    get,
    path = "/journal/entries/{id}",
    params(("id" = Uuid, Path, description = "Entry ID")),
    responses(
        (status = 200, description = "Entry", body = JournalEntry),
        (status = 404, description = "Not Found")
    )
)]
pub async fn get_entry(
    AuthUser { id: user_id, .. }: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<JournalEntry>, ApiError> {
    state
        .repo
        .get_entry(id, user_id)
        .await?
        .map(Json)
        .ok_or(ApiError::NotFound)
}

/// update_entry
///
/// [Authenticated Route] Partial update. The owner check is part of the repository query, so a
/// foreign entry is indistinguishable from a missing one.
#[utoipa::path(
    put,
    path = "/journal/entries/{id}",
    params(("id" = Uuid, Path, description = "Entry ID")),
    request_body = UpdateJournalEntryRequest,
    responses(
        (status = 200, description = "Updated", body = JournalEntry),
        (status = 404, description = "Not Found")
    )
)]
pub async fn update_entry(
    AuthUser { id: user_id, .. }: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateJournalEntryRequest>,
) -> Result<Json<JournalEntry>, ApiError> {
    let blank = |field: &Option<String>| field.as_deref().is_some_and(|v| v.trim().is_empty());
    if blank(&payload.title) || blank(&payload.content) {
        return Err(ApiError::BadRequest(
            "title and content must not be empty".into(),
        ));
    }

    state
        .repo
        .update_entry(id, user_id, payload)
        .await?
        .map(Json)
        .ok_or(ApiError::NotFound)
}

/// delete_entry
///
/// [Authenticated Route] Removes one of the caller's entries.
#[utoipa::path(
    delete,
    path = "/journal/entries/{id}",
    params(("id" = Uuid, Path, description = "Entry ID")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 404, description = "Not Found")
    )
)]
pub async fn delete_entry(
    AuthUser { id: user_id, .. }: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    if state.repo.delete_entry(id, user_id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound)
    }
}

/// analyze_entry
///
/// [Authenticated Route] Runs the entry through the active prompt template and stores the
/// completion on the entry.
#[utoipa::path(
    post,
    path = "/journal/entries/{id}/analysis",
    params(("id" = Uuid, Path, description = "Entry ID")),
    responses(
        (status = 200, description = "Analyzed", body = JournalEntry),
        (status = 404, description = "Not Found"),
        (status = 409, description = "No active prompt template"),
        (status = 502, description = "Analysis provider failed")
    )
)]
pub async fn analyze_entry(
    AuthUser { id: user_id, .. }: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<JournalEntry>, ApiError> {
    let entry = state
        .repo
        .get_entry(id, user_id)
        .await?
        .ok_or(ApiError::NotFound)?;

    let prompt = state
        .repo
        .get_active_prompt()
        .await?
        .ok_or(ApiError::Conflict("No active prompt template"))?;

    tracing::debug!(entry_id = %id, prompt_id = %prompt.id, "analyzing entry");
    let analysis = state.analyzer.analyze(&prompt.render(&entry)).await?;

    // The entry may have been deleted while the completion was running.
    state
        .repo
        .save_analysis(id, user_id, analysis)
        .await?
        .map(Json)
        .ok_or(ApiError::NotFound)
}

/// admin_login_page
///
/// [Admin Sign-In Route] Reached by anonymous callers and non-admins. Admins never get here:
/// the access gate forwards them to the dashboard.
#[utoipa::path(
    get,
    path = "/admin/login",
    params(RedirectQuery),
    responses((status = 200, description = "Admin sign-in page", body = AdminLoginPage))
)]
pub async fn admin_login_page(Query(query): Query<RedirectQuery>) -> Json<AdminLoginPage> {
    Json(AdminLoginPage {
        action: access::ADMIN_SIGN_IN_PATH.to_string(),
        redirected_from: query.redirected_from,
    })
}

/// admin_login
///
/// [Admin Sign-In Route] Password grant followed by a fresh role lookup. Only a confirmed admin
/// receives the session cookie together with the signed `admin_session` flag; everybody else is
/// refused without a session being established, and loses any flag the browser still carries.
#[utoipa::path(
    post,
    path = "/admin/login",
    request_body = SignInRequest,
    responses(
        (status = 303, description = "Signed in as admin, redirecting"),
        (status = 401, description = "Invalid credentials"),
        (status = 403, description = "Not an admin"),
        (status = 503, description = "Role store unavailable")
    )
)]
pub async fn admin_login(
    State(state): State<AppState>,
    State(gate): State<AccessGate>,
    jar: CookieJar,
    signed: SignedCookieJar,
    Json(payload): Json<SignInRequest>,
) -> Result<Response, ApiError> {
    validate_credentials(&payload.email, &payload.password)?;

    let tokens = state
        .auth_provider
        .sign_in_with_password(&payload.email, &payload.password)
        .await?;

    let identity = Identity {
        id: tokens.user_id,
        email: tokens.email.clone(),
    };

    let role = gate.lookup_role(&identity).await?;
    if !role.is_admin() {
        tracing::info!(user_id = %identity.id, role = role.as_str(), "admin sign-in refused");
        let signed = session_flag::clear_flag(signed);
        return Ok((signed, ApiError::Forbidden("Admin access required")).into_response());
    }

    let target = match payload.redirected_from.as_deref() {
        Some(path) if path.starts_with("/admin/") && !path.starts_with(access::ADMIN_SIGN_IN_PATH) => {
            access::local_redirect_target(Some(path), access::ADMIN_LANDING_PATH)
        }
        _ => access::ADMIN_LANDING_PATH.to_string(),
    };

    tracing::info!(user_id = %identity.id, role = role.as_str(), "admin signed in");

    let jar = jar.add(auth::session_cookie(
        &state.config,
        tokens.access_token,
        tokens.expires_in,
    ));
    let signed = session_flag::write_flag(
        signed,
        state.config.admin_session_ttl,
        state.config.secure_cookies,
    );
    Ok((jar, signed, Redirect::to(&target)).into_response())
}

/// get_dashboard
///
/// [Admin Route] Aggregate counts for the admin dashboard.
#[utoipa::path(
    get,
    path = "/admin/dashboard",
    responses(
        (status = 200, description = "Stats", body = AdminDashboardStats),
        (status = 403, description = "Not an admin")
    )
)]
pub async fn get_dashboard(
    _admin: AdminUser,
    State(state): State<AppState>,
) -> Result<Json<AdminDashboardStats>, ApiError> {
    Ok(Json(state.repo.get_stats().await?))
}

/// list_prompts
///
/// [Admin Route] Every prompt template, active one included.
#[utoipa::path(
    get,
    path = "/admin/prompts",
    responses((status = 200, description = "Prompt templates", body = [PromptTemplate]))
)]
pub async fn list_prompts(
    _admin: AdminUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<PromptTemplate>>, ApiError> {
    Ok(Json(state.repo.list_prompts().await?))
}

/// create_prompt
///
/// [Admin Route] Adds an inactive template. The template text must contain the `{{entry}}`
/// placeholder.
#[utoipa::path(
    post,
    path = "/admin/prompts",
    request_body = CreatePromptTemplateRequest,
    responses(
        (status = 201, description = "Created", body = PromptTemplate),
        (status = 400, description = "Invalid template")
    )
)]
pub async fn create_prompt(
    AdminUser { id, .. }: AdminUser,
    State(state): State<AppState>,
    Json(payload): Json<CreatePromptTemplateRequest>,
) -> Result<(StatusCode, Json<PromptTemplate>), ApiError> {
    if payload.name.trim().is_empty() {
        return Err(ApiError::BadRequest("name must not be empty".into()));
    }
    validate_template(&payload.template)?;

    let prompt = state.repo.create_prompt(payload, id).await?;
    tracing::info!(prompt_id = %prompt.id, admin_id = %id, "prompt template created");
    Ok((StatusCode::CREATED, Json(prompt)))
}

/// update_prompt
///
/// [Admin Route] Partial update of a template.
#[utoipa::path(
    put,
    path = "/admin/prompts/{id}",
    params(("id" = Uuid, Path, description = "Prompt template ID")),
    request_body = UpdatePromptTemplateRequest,
    responses(
        (status = 200, description = "Updated", body = PromptTemplate),
        (status = 400, description = "Invalid template"),
        (status = 404, description = "Not Found")
    )
)]
pub async fn update_prompt(
    _admin: AdminUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdatePromptTemplateRequest>,
) -> Result<Json<PromptTemplate>, ApiError> {
    if let Some(template) = &payload.template {
        validate_template(template)?;
    }

    state
        .repo
        .update_prompt(id, payload)
        .await?
        .map(Json)
        .ok_or(ApiError::NotFound)
}

/// delete_prompt
///
/// [Admin Route] Removes a template. Deleting the active template leaves analysis disabled
/// until another one is activated.
#[utoipa::path(
    delete,
    path = "/admin/prompts/{id}",
    params(("id" = Uuid, Path, description = "Prompt template ID")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 404, description = "Not Found")
    )
)]
pub async fn delete_prompt(
    AdminUser { id: admin_id, .. }: AdminUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    if state.repo.delete_prompt(id).await? {
        tracing::info!(prompt_id = %id, admin_id = %admin_id, "prompt template deleted");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound)
    }
}

/// activate_prompt
///
/// [Admin Route] Makes the template the single active one.
#[utoipa::path(
    post,
    path = "/admin/prompts/{id}/activate",
    params(("id" = Uuid, Path, description = "Prompt template ID")),
    responses(
        (status = 200, description = "Activated", body = PromptTemplate),
        (status = 404, description = "Not Found")
    )
)]
pub async fn activate_prompt(
    AdminUser { id: admin_id, .. }: AdminUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<PromptTemplate>, ApiError> {
    let prompt = state
        .repo
        .activate_prompt(id)
        .await?
        .ok_or(ApiError::NotFound)?;

    tracing::info!(prompt_id = %id, admin_id = %admin_id, "prompt template activated");
    Ok(Json(prompt))
}

// --- Validation ---

fn validate_credentials(email: &str, password: &str) -> Result<(), ApiError> {
    if !email.contains('@') || password.is_empty() {
        return Err(ApiError::BadRequest(
            "a valid email and a password are required".into(),
        ));
    }
    Ok(())
}

fn validate_template(template: &str) -> Result<(), ApiError> {
    if !template.contains(ENTRY_PLACEHOLDER) {
        return Err(ApiError::BadRequest(format!(
            "template must contain the {ENTRY_PLACEHOLDER} placeholder"
        )));
    }
    Ok(())
}
