use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

/// RepositoryError
///
/// Failure of a persistence operation. "Row not found" is expressed through `Option`
/// return values, never through this type.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    /// A row was read but could not be interpreted (e.g. an unknown role string).
    #[error("malformed row: {0}")]
    Malformed(String),
}

/// AccessError
///
/// Errors raised while computing an access decision. Anonymous callers and missing role
/// rows are not errors and never appear here.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AccessError {
    /// The role store could not be read (connectivity, malformed row, timeout).
    #[error("role query failed: {0}")]
    RoleQueryFailure(String),
    /// Both role schemas hold a row for the user and they disagree.
    #[error("inconsistent role records for user {user_id}: user_roles={canonical}, admin_users={legacy}")]
    InconsistentRoleSchema {
        user_id: uuid::Uuid,
        canonical: String,
        legacy: String,
    },
}

/// AnalyzerError
///
/// Failures talking to the LLM completion provider.
#[derive(Debug, Error)]
pub enum AnalyzerError {
    #[error("llm request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("llm provider returned status {0}")]
    Status(u16),
    #[error("llm response contained no completion")]
    EmptyCompletion,
    #[error("{0}")]
    Unavailable(String),
}

/// AuthProviderError
///
/// Failures talking to Supabase Auth. `Rejected` is the provider refusing the request
/// (bad credentials, duplicate e-mail, weak password).
#[derive(Debug, Error)]
pub enum AuthProviderError {
    #[error("auth provider rejected the request with status {0}")]
    Rejected(u16),
    #[error("auth provider request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("{0}")]
    Malformed(String),
}

/// ApiError
///
/// The error type returned by handlers. Rendered as a JSON body of the form
/// `{"error": {"code": ..., "message": ...}}`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("authentication required")]
    Unauthorized,
    #[error("{0}")]
    Forbidden(&'static str),
    #[error("resource not found")]
    NotFound,
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Conflict(&'static str),
    #[error("service temporarily unavailable")]
    Unavailable,
    #[error(transparent)]
    Access(#[from] AccessError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Analyzer(#[from] AnalyzerError),
    #[error(transparent)]
    AuthProvider(#[from] AuthProviderError),
}

impl ApiError {
    fn parts(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            ApiError::Forbidden(_) => (StatusCode::FORBIDDEN, "FORBIDDEN"),
            ApiError::NotFound => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            ApiError::Conflict(_) => (StatusCode::CONFLICT, "CONFLICT"),
            ApiError::Unavailable => (StatusCode::SERVICE_UNAVAILABLE, "UNAVAILABLE"),
            ApiError::Access(AccessError::RoleQueryFailure(_)) => {
                (StatusCode::SERVICE_UNAVAILABLE, "ROLE_QUERY_FAILURE")
            }
            ApiError::Access(AccessError::InconsistentRoleSchema { .. }) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "INCONSISTENT_ROLE_SCHEMA")
            }
            ApiError::Repository(_) => (StatusCode::INTERNAL_SERVER_ERROR, "DATABASE_ERROR"),
            ApiError::Analyzer(_) => (StatusCode::BAD_GATEWAY, "ANALYSIS_FAILED"),
            ApiError::AuthProvider(AuthProviderError::Rejected(_)) => {
                (StatusCode::UNAUTHORIZED, "CREDENTIALS_REJECTED")
            }
            ApiError::AuthProvider(_) => (StatusCode::BAD_GATEWAY, "AUTH_PROVIDER_ERROR"),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.parts().0
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.parts();

        // Internal details stay in the logs.
        let message = if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
            match status {
                StatusCode::BAD_GATEWAY => "Upstream service failed".to_string(),
                StatusCode::SERVICE_UNAVAILABLE => "Service temporarily unavailable".to_string(),
                _ => "Internal server error".to_string(),
            }
        } else {
            self.to_string()
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}
