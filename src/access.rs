//! Role-based access control for every layer of the application.
//!
//! `decide` is the single, pure decision procedure. `AccessGate` feeds it: it resolves the
//! session, consults the `admin_session` flag, performs the role lookup under a timeout and
//! applies the configured failure policy. The edge middleware (`access_gate`) and the
//! `AuthUser`/`AdminUser` extractors all go through the same gate, so they cannot disagree.

use axum::{
    extract::{FromRef, Query, Request, State},
    http::{Extensions, HeaderMap, Uri},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::{Key, SignedCookieJar};
use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};
use serde::Deserialize;
use tokio::time::timeout;

use crate::{
    AppState,
    auth::{Identity, resolve_session},
    config::{AccessFailurePolicy, AppConfig},
    error::{AccessError, ApiError},
    models::Role,
    repository::RepositoryState,
    session_flag,
};

pub const SIGN_IN_PATH: &str = "/auth/signin";
pub const SIGN_OUT_PATH: &str = "/auth/signout";
pub const ADMIN_SIGN_IN_PATH: &str = "/admin/login";
pub const ADMIN_LANDING_PATH: &str = "/admin/dashboard";
pub const USER_LANDING_PATH: &str = "/journal";

/// Query parameter carrying the originally requested path to the sign-in pages.
pub const REDIRECTED_FROM_PARAM: &str = "redirectedFrom";
/// Query parameter marking a request as the product of a just-performed redirect.
pub const AUTH_REDIRECT_PARAM: &str = "authRedirect";

/// RouteSensitivity
///
/// Static classification of a path, by segment-aware prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteSensitivity {
    Public,
    /// `/auth/*`: sign-in pages; identified callers are sent away.
    AnonymousOnly,
    /// `/journal/*`, `/profile/*`.
    RequiresIdentity,
    /// `/admin/login`: open to everyone, but admins are forwarded to the landing page.
    AdminSignIn,
    /// `/admin` and everything below it except `/admin/login`.
    RequiresAdmin,
}

impl RouteSensitivity {
    pub fn classify(path: &str) -> Self {
        if under(path, ADMIN_SIGN_IN_PATH) {
            RouteSensitivity::AdminSignIn
        } else if under(path, "/admin") {
            RouteSensitivity::RequiresAdmin
        } else if under(path, "/journal") || under(path, "/profile") {
            RouteSensitivity::RequiresIdentity
        } else if under(path, SIGN_OUT_PATH) {
            RouteSensitivity::Public
        } else if under(path, "/auth") {
            RouteSensitivity::AnonymousOnly
        } else {
            RouteSensitivity::Public
        }
    }

    /// Whether deciding this route needs the caller's role.
    pub fn needs_role(&self) -> bool {
        matches!(
            self,
            RouteSensitivity::RequiresAdmin | RouteSensitivity::AdminSignIn
        )
    }
}

/// `path` equals `prefix` or continues below it with a `/`.
fn under(path: &str, prefix: &str) -> bool {
    path.strip_prefix(prefix)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
}

/// Caller
///
/// What the session resolver and role lookup learned about the caller. The role of an
/// identified caller is only meaningful for routes where `needs_role()` holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Caller {
    Anonymous,
    Identified(Role),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allow,
    /// Deny (or forward) with a redirect to `location`.
    Redirect(String),
}

/// decide
///
/// The access decision. Pure: the same inputs always produce the same decision.
pub fn decide(sensitivity: RouteSensitivity, path: &str, caller: Caller) -> Decision {
    use RouteSensitivity::*;

    match (sensitivity, caller) {
        (RequiresIdentity, Caller::Anonymous) => {
            Decision::Redirect(with_redirected_from(SIGN_IN_PATH, path))
        }
        (RequiresAdmin, Caller::Anonymous) => {
            Decision::Redirect(with_redirected_from(ADMIN_SIGN_IN_PATH, path))
        }
        (RequiresAdmin, Caller::Identified(role)) if !role.is_admin() => {
            Decision::Redirect(ADMIN_SIGN_IN_PATH.to_string())
        }
        (AdminSignIn, Caller::Identified(role)) if role.is_admin() => {
            Decision::Redirect(ADMIN_LANDING_PATH.to_string())
        }
        (AnonymousOnly, Caller::Identified(_)) => Decision::Redirect(USER_LANDING_PATH.to_string()),
        _ => Decision::Allow,
    }
}

fn with_redirected_from(target: &str, path: &str) -> String {
    format!("{target}?{REDIRECTED_FROM_PARAM}={}", encode_query_value(path))
}

/// Characters escaped in a `redirectedFrom` value. `/` stays literal so the target reads as a
/// path in the `Location` header.
const QUERY_VALUE: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'&')
    .add(b'+')
    .add(b'<')
    .add(b'=')
    .add(b'>')
    .add(b'?')
    .add(b'`');

fn encode_query_value(value: &str) -> String {
    utf8_percent_encode(value, QUERY_VALUE).to_string()
}

/// Picks the post-sign-in destination. Only same-origin paths are honored, so a crafted
/// `redirectedFrom` cannot bounce the caller to another site.
pub fn local_redirect_target(requested: Option<&str>, fallback: &str) -> String {
    match requested {
        Some(path)
            if path.starts_with('/')
                && !path.starts_with("//")
                && !path.starts_with("/\\")
                && !path.contains(['\r', '\n']) =>
        {
            path.to_string()
        }
        _ => fallback.to_string(),
    }
}

/// RedirectMarker
///
/// Request-scoped loop-prevention marker. Layers that redirect internally insert it instead of
/// the `authRedirect=true` URL parameter, which leaks into browser history.
#[derive(Debug, Clone, Copy)]
pub struct RedirectMarker;

#[derive(Debug, Deserialize)]
struct AuthRedirectQuery {
    #[serde(rename = "authRedirect")]
    auth_redirect: Option<String>,
}

/// True if the request is itself the product of an access redirect.
pub fn has_redirect_marker(uri: &Uri, extensions: &Extensions) -> bool {
    if extensions.get::<RedirectMarker>().is_some() {
        return true;
    }
    Query::<AuthRedirectQuery>::try_from_uri(uri)
        .is_ok_and(|Query(query)| query.auth_redirect.as_deref() == Some("true"))
}

/// AccessGrant
///
/// Recorded in the request extensions by the gate middleware so leaf extractors reuse the
/// gate's work. `role` is `None` when the route did not require a lookup.
#[derive(Debug, Clone)]
pub struct AccessGrant {
    pub identity: Identity,
    pub role: Option<Role>,
}

/// Outcome
///
/// The gate's verdict: a decision, or what the failure policy made of a failed lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Decided(Decision),
    /// Fail-open: no decision, the request proceeds unmodified.
    Proceed,
    /// Fail-closed: the role store could not be asked.
    Unavailable,
    /// The role schemas disagree for this user. Never failed open.
    IntegrityFailure(AccessError),
}

#[derive(Debug, Clone)]
pub struct Evaluation {
    pub sensitivity: RouteSensitivity,
    pub outcome: Outcome,
    pub grant: Option<AccessGrant>,
}

/// AccessGate
///
/// The shared entry point to the access decision. Cheap to clone.
#[derive(Clone)]
pub struct AccessGate {
    repo: RepositoryState,
    config: AppConfig,
    key: Key,
}

impl FromRef<AppState> for AccessGate {
    fn from_ref(state: &AppState) -> Self {
        AccessGate::new(state.repo.clone(), state.config.clone(), state.cookie_key.clone())
    }
}

impl AccessGate {
    pub fn new(repo: RepositoryState, config: AppConfig, key: Key) -> Self {
        Self { repo, config, key }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// lookup_role
    ///
    /// Fresh read of the canonical role record, cross-checked against the legacy table when
    /// configured. A missing row is `Role::None`. Bounded by `role_query_timeout`; expiry is a
    /// `RoleQueryFailure`.
    pub async fn lookup_role(&self, identity: &Identity) -> Result<Role, AccessError> {
        match timeout(self.config.role_query_timeout, self.query_role(identity)).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(user_id = %identity.id, "role lookup timed out");
                Err(AccessError::RoleQueryFailure(format!(
                    "timed out after {:?}",
                    self.config.role_query_timeout
                )))
            }
        }
    }

    async fn query_role(&self, identity: &Identity) -> Result<Role, AccessError> {
        let failure = |e: crate::error::RepositoryError| {
            tracing::error!(user_id = %identity.id, error = %e, "role query failed");
            AccessError::RoleQueryFailure(e.to_string())
        };

        let canonical = match self.repo.get_role_record(identity.id).await.map_err(failure)? {
            Some(record) => Role::from_db(&record.role).map_err(failure)?,
            None => Role::None,
        };

        if self.config.check_legacy_roles {
            let legacy = self
                .repo
                .get_legacy_admin_record(identity.id)
                .await
                .map_err(failure)?;

            if let Some(legacy) = legacy {
                let legacy_role = legacy.role();
                if legacy_role.privilege() != canonical.privilege() {
                    tracing::error!(
                        user_id = %identity.id,
                        canonical = canonical.as_str(),
                        legacy = legacy_role.as_str(),
                        "role schemas disagree"
                    );
                    return Err(AccessError::InconsistentRoleSchema {
                        user_id: identity.id,
                        canonical: canonical.as_str().to_string(),
                        legacy: legacy_role.as_str().to_string(),
                    });
                }
            }
        }

        Ok(canonical)
    }

    /// resolve_role
    ///
    /// The role as the gate sees it: a valid `admin_session` flag short-circuits the lookup and
    /// counts as `Admin` (the super_admin distinction is not cached).
    pub async fn resolve_role(
        &self,
        identity: &Identity,
        headers: &HeaderMap,
    ) -> Result<Role, AccessError> {
        let jar = SignedCookieJar::from_headers(headers, self.key.clone());
        if session_flag::read_flag(&jar) {
            tracing::debug!(user_id = %identity.id, "admin session flag present, skipping role lookup");
            return Ok(Role::Admin);
        }
        self.lookup_role(identity).await
    }

    /// evaluate
    ///
    /// Runs the full procedure for one request:
    /// `UNCHECKED -> (IDENTIFIED | ANONYMOUS) -> (ALLOWED | DENIED)`.
    pub async fn evaluate(&self, uri: &Uri, headers: &HeaderMap, redirect_marker: bool) -> Evaluation {
        let path = uri.path();
        let sensitivity = RouteSensitivity::classify(path);

        if sensitivity == RouteSensitivity::Public {
            return Evaluation {
                sensitivity,
                outcome: Outcome::Decided(Decision::Allow),
                grant: None,
            };
        }

        let identity = resolve_session(headers, &self.config);

        if redirect_marker {
            tracing::debug!(path, "redirect marker present, allowing without role check");
            return Evaluation {
                sensitivity,
                outcome: Outcome::Decided(Decision::Allow),
                grant: identity.map(|identity| AccessGrant { identity, role: None }),
            };
        }

        let Some(identity) = identity else {
            return Evaluation {
                sensitivity,
                outcome: Outcome::Decided(decide(sensitivity, path, Caller::Anonymous)),
                grant: None,
            };
        };

        let role = if sensitivity.needs_role() {
            match self.resolve_role(&identity, headers).await {
                Ok(role) => Some(role),
                Err(error) => {
                    let outcome = self.on_failure(&error, path);
                    return Evaluation {
                        sensitivity,
                        outcome,
                        grant: Some(AccessGrant {
                            identity,
                            role: None,
                        }),
                    };
                }
            }
        } else {
            None
        };

        let decision = decide(
            sensitivity,
            path,
            Caller::Identified(role.unwrap_or_default()),
        );

        Evaluation {
            sensitivity,
            outcome: Outcome::Decided(decision),
            grant: Some(AccessGrant { identity, role }),
        }
    }

    fn on_failure(&self, error: &AccessError, path: &str) -> Outcome {
        match (error, self.config.failure_policy) {
            (AccessError::InconsistentRoleSchema { .. }, _) => {
                Outcome::IntegrityFailure(error.clone())
            }
            (AccessError::RoleQueryFailure(_), AccessFailurePolicy::FailOpen) => {
                tracing::warn!(path, error = %error, "access check failed, proceeding (fail-open)");
                Outcome::Proceed
            }
            (AccessError::RoleQueryFailure(_), AccessFailurePolicy::FailClosed) => {
                tracing::warn!(path, error = %error, "access check failed, refusing (fail-closed)");
                Outcome::Unavailable
            }
        }
    }
}

/// access_gate
///
/// Edge middleware applied to the whole router. Evaluates the request once, records the
/// grant for the handlers and turns the outcome into a response.
pub async fn access_gate(
    State(gate): State<AccessGate>,
    mut request: Request,
    next: Next,
) -> Response {
    let uri = request.uri().clone();
    let headers = request.headers().clone();
    let marked = has_redirect_marker(&uri, request.extensions());

    let evaluation = gate.evaluate(&uri, &headers, marked).await;

    if let Some(grant) = evaluation.grant {
        request.extensions_mut().insert(grant);
    }

    match evaluation.outcome {
        Outcome::Decided(Decision::Allow) | Outcome::Proceed => next.run(request).await,
        Outcome::Decided(Decision::Redirect(location)) => {
            tracing::info!(
                path = uri.path(),
                sensitivity = ?evaluation.sensitivity,
                location = %location,
                "access redirect"
            );
            Redirect::temporary(&location).into_response()
        }
        Outcome::Unavailable => ApiError::Unavailable.into_response(),
        Outcome::IntegrityFailure(error) => ApiError::Access(error).into_response(),
    }
}
