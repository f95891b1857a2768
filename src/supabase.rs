use async_trait::async_trait;
use jsonwebtoken::{EncodingKey, Header, encode};
use serde::Deserialize;
use std::{
    sync::Arc,
    time::{SystemTime, UNIX_EPOCH},
};
use uuid::Uuid;

use crate::{auth::Claims, error::AuthProviderError};

/// SessionTokens
///
/// What a successful password sign-in yields.
#[derive(Debug, Clone)]
pub struct SessionTokens {
    pub access_token: String,
    pub expires_in: i64,
    pub user_id: Uuid,
    pub email: String,
}

/// AuthProvider
///
/// Contract for the external authentication provider. Password hashing, session issuance and
/// refresh all live on the provider side; this service only forwards credentials.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Creates an account and returns its `auth.users.id`.
    async fn sign_up(&self, email: &str, password: &str) -> Result<Uuid, AuthProviderError>;

    /// Exchanges credentials for an access token.
    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<SessionTokens, AuthProviderError>;
}

pub type AuthProviderState = Arc<dyn AuthProvider>;

/// SupabaseAuthClient
///
/// `AuthProvider` over the Supabase Auth REST API (`/auth/v1`).
#[derive(Clone)]
pub struct SupabaseAuthClient {
    http: reqwest::Client,
    base_url: String,
    anon_key: String,
}

impl SupabaseAuthClient {
    pub fn new(base_url: &str, anon_key: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            anon_key: anon_key.to_string(),
        }
    }
}

#[derive(Deserialize)]
struct SignUpResponse {
    // Supabase returns the user either at the top level or nested, depending on whether
    // e-mail confirmation is enabled.
    id: Option<Uuid>,
    user: Option<ProviderUser>,
}

#[derive(Deserialize)]
struct ProviderUser {
    id: Uuid,
    email: Option<String>,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
    user: ProviderUser,
}

#[async_trait]
impl AuthProvider for SupabaseAuthClient {
    async fn sign_up(&self, email: &str, password: &str) -> Result<Uuid, AuthProviderError> {
        let response = self
            .http
            .post(format!("{}/auth/v1/signup", self.base_url))
            .header("apikey", &self.anon_key)
            .json(&serde_json::json!({ "email": email, "password": password }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(AuthProviderError::Rejected(response.status().as_u16()));
        }

        let body = response.json::<SignUpResponse>().await?;
        body.id
            .or(body.user.map(|user| user.id))
            .ok_or_else(|| AuthProviderError::Malformed("signup response carried no user id".into()))
    }

    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<SessionTokens, AuthProviderError> {
        let response = self
            .http
            .post(format!("{}/auth/v1/token?grant_type=password", self.base_url))
            .header("apikey", &self.anon_key)
            .json(&serde_json::json!({ "email": email, "password": password }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(AuthProviderError::Rejected(response.status().as_u16()));
        }

        let body = response.json::<TokenResponse>().await?;
        Ok(SessionTokens {
            access_token: body.access_token,
            expires_in: body.expires_in,
            user_id: body.user.id,
            email: body.user.email.unwrap_or_else(|| email.to_string()),
        })
    }
}

/// MockAccount
#[derive(Clone, Debug)]
pub struct MockAccount {
    pub id: Uuid,
    pub email: String,
    pub password: String,
}

/// MockAuthProvider
///
/// In-memory `AuthProvider` for tests. Issues real HS256 tokens signed with `jwt_secret`, so
/// they pass the session resolver exactly like Supabase tokens.
#[derive(Clone, Debug)]
pub struct MockAuthProvider {
    pub accounts: Vec<MockAccount>,
    pub jwt_secret: String,
    /// When true, every call fails as if the provider were unreachable.
    pub should_fail: bool,
}

impl MockAuthProvider {
    pub fn new(jwt_secret: &str) -> Self {
        Self {
            accounts: Vec::new(),
            jwt_secret: jwt_secret.to_string(),
            should_fail: false,
        }
    }

    pub fn with_account(mut self, id: Uuid, email: &str, password: &str) -> Self {
        self.accounts.push(MockAccount {
            id,
            email: email.to_string(),
            password: password.to_string(),
        });
        self
    }

    /// Mints an access token valid for `ttl_secs`.
    pub fn issue_token(&self, user_id: Uuid, email: &str, ttl_secs: u64) -> String {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        let claims = Claims {
            sub: user_id,
            email: Some(email.to_string()),
            exp: (now + ttl_secs) as usize,
            iat: Some(now as usize),
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.jwt_secret.as_bytes()),
        )
        .unwrap_or_default()
    }
}

#[async_trait]
impl AuthProvider for MockAuthProvider {
    async fn sign_up(&self, email: &str, _password: &str) -> Result<Uuid, AuthProviderError> {
        if self.should_fail {
            return Err(AuthProviderError::Malformed("mock provider offline".into()));
        }
        if self.accounts.iter().any(|account| account.email == email) {
            return Err(AuthProviderError::Rejected(422));
        }
        Ok(Uuid::new_v4())
    }

    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<SessionTokens, AuthProviderError> {
        if self.should_fail {
            return Err(AuthProviderError::Malformed("mock provider offline".into()));
        }
        let account = self
            .accounts
            .iter()
            .find(|account| account.email == email && account.password == password)
            .ok_or(AuthProviderError::Rejected(400))?;

        Ok(SessionTokens {
            access_token: self.issue_token(account.id, &account.email, 3600),
            expires_in: 3600,
            user_id: account.id,
            email: account.email.clone(),
        })
    }
}
