use axum::{
    extract::{FromRef, FromRequestParts},
    http::{HeaderMap, header, request::Parts},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use jsonwebtoken::{DecodingKey, Validation, decode, errors::ErrorKind};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    access::{AccessGate, AccessGrant},
    config::AppConfig,
    error::ApiError,
    models::Role,
};

/// Claims
///
/// The subset of a Supabase access token's payload this service relies on.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (sub): the `auth.users.id` of the caller.
    pub sub: Uuid,
    #[serde(default)]
    pub email: Option<String>,
    /// Expiration Time (exp): always validated.
    pub exp: usize,
    #[serde(default)]
    pub iat: Option<usize>,
}

/// Identity
///
/// An authenticated user as known to the auth provider. Never mutated here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identity {
    pub id: Uuid,
    pub email: String,
}

/// resolve_session
///
/// Session Resolver. Reads the access token from the session cookie, falling back to an
/// `Authorization: Bearer` header, and validates it.
///
/// Returns `None` for every failure (no token, expired, bad signature, malformed). An
/// anonymous caller is not an error, and a rejected token never grants anything.
pub fn resolve_session(headers: &HeaderMap, config: &AppConfig) -> Option<Identity> {
    let jar = CookieJar::from_headers(headers);

    let token = jar
        .get(&config.session_cookie_name)
        .map(|cookie| cookie.value().to_string())
        .or_else(|| {
            headers
                .get(header::AUTHORIZATION)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.strip_prefix("Bearer "))
                .map(str::to_string)
        })?;

    let claims = decode_access_token(&token, &config.jwt_secret)?;

    Some(Identity {
        id: claims.sub,
        email: claims.email.unwrap_or_default(),
    })
}

/// Validates an HS256 access token and returns its claims.
pub fn decode_access_token(token: &str, secret: &str) -> Option<Claims> {
    let decoding_key = DecodingKey::from_secret(secret.as_bytes());

    let mut validation = Validation::default();
    validation.validate_exp = true;
    // Supabase sets `aud = "authenticated"`; the signature is what we trust.
    validation.validate_aud = false;

    match decode::<Claims>(token, &decoding_key, &validation) {
        Ok(data) => Some(data.claims),
        Err(e) => {
            match e.kind() {
                ErrorKind::ExpiredSignature => tracing::debug!("session token expired"),
                kind => tracing::debug!(?kind, "session token rejected"),
            }
            None
        }
    }
}

/// Builds the http-only cookie carrying the access token.
pub fn session_cookie(config: &AppConfig, access_token: String, max_age_secs: i64) -> Cookie<'static> {
    Cookie::build((config.session_cookie_name.clone(), access_token))
        .path("/")
        .http_only(true)
        .secure(config.secure_cookies)
        .same_site(SameSite::Lax)
        .max_age(time::Duration::seconds(max_age_secs))
        .build()
}

/// Removal cookie for the session token.
pub fn clear_session_cookie(config: &AppConfig) -> Cookie<'static> {
    Cookie::build((config.session_cookie_name.clone(), ""))
        .path("/")
        .max_age(time::Duration::ZERO)
        .build()
}

// --- Extractors ---

/// AuthUser
///
/// Extractor for handlers that require an identity. Reuses the `AccessGrant` recorded by the
/// access gate middleware when present, otherwise resolves the session itself.
///
/// Rejection: `ApiError::Unauthorized` (401).
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: Uuid,
    pub email: String,
}

impl From<Identity> for AuthUser {
    fn from(identity: Identity) -> Self {
        AuthUser {
            id: identity.id,
            email: identity.email,
        }
    }
}

impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    AccessGate: FromRef<S>,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if let Some(grant) = parts.extensions.get::<AccessGrant>() {
            return Ok(grant.identity.clone().into());
        }

        let gate = AccessGate::from_ref(state);
        resolve_session(&parts.headers, gate.config())
            .map(AuthUser::from)
            .ok_or(ApiError::Unauthorized)
    }
}

/// AdminUser
///
/// Extractor for admin handlers. Uses the role the gate already established for this request,
/// or asks the same `AccessGate` for it. Never redirects: a non-admin gets 403, which is what
/// a request carrying the loop-prevention marker ends up with.
#[derive(Debug, Clone)]
pub struct AdminUser {
    pub id: Uuid,
    pub email: String,
    pub role: Role,
}

impl<S> FromRequestParts<S> for AdminUser
where
    S: Send + Sync,
    AccessGate: FromRef<S>,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let gate = AccessGate::from_ref(state);

        let (identity, known_role) = match parts.extensions.get::<AccessGrant>() {
            Some(grant) => (grant.identity.clone(), grant.role),
            None => (
                resolve_session(&parts.headers, gate.config()).ok_or(ApiError::Unauthorized)?,
                None,
            ),
        };

        let role = match known_role {
            Some(role) => role,
            None => gate.resolve_role(&identity, &parts.headers).await?,
        };

        if !role.is_admin() {
            tracing::info!(user_id = %identity.id, role = role.as_str(), "admin handler refused");
            return Err(ApiError::Forbidden("Admin access required"));
        }

        Ok(AdminUser {
            id: identity.id,
            email: identity.email,
            role,
        })
    }
}
