//! Authentication and session lifecycle: request gating, credential
//! carriers and the login/refresh/logout flows.

pub mod credentials;
pub mod flows;
pub mod gate;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use std::fmt;
use thiserror::Error;

use crate::api::response::ApiError;
use crate::cache::CacheError;
use crate::session::SessionError;
use crate::storage::models::Role;
use crate::storage::StoreError;
use crate::tokens::{PasswordError, TokenError};

pub use gate::{AuthContext, AuthGate, CurrentPrincipal, RequiredRoles};

/// Why a request was not authenticated. Logged, never sent to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnauthenticatedReason {
    BackendUnavailable,
    InvalidToken(TokenError),
    MissingToken,
    NoSession,
    SessionSuperseded,
}

impl fmt::Display for UnauthenticatedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnauthenticatedReason::BackendUnavailable => f.write_str("session backend unavailable"),
            UnauthenticatedReason::InvalidToken(e) => write!(f, "{e}"),
            UnauthenticatedReason::MissingToken => f.write_str("no credentials"),
            UnauthenticatedReason::NoSession => f.write_str("no live session"),
            UnauthenticatedReason::SessionSuperseded => f.write_str("session superseded"),
        }
    }
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Please login to access this resource")]
    Unauthenticated(UnauthenticatedReason),
    #[error("Role {role} is not allowed to access this resource")]
    Forbidden { role: Role },
    #[error("Session expired, please login again")]
    SessionExpired,
    #[error("Invalid email or password")]
    InvalidCredentials,
    #[error("Invalid or expired activation code")]
    InvalidActivation,
    #[error("Email already exists")]
    EmailTaken,
    #[error("{0}")]
    Invalid(String),
    #[error("Cache backend error: {0}")]
    Cache(#[from] CacheError),
    #[error("Password error: {0}")]
    Password(#[from] PasswordError),
    #[error("Session error: {0}")]
    Session(#[from] SessionError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<AuthError> for ApiError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::Unauthenticated(reason) => {
                tracing::debug!(reason = %reason, "Request not authenticated");
                ApiError::unauthenticated(e.to_string())
            }
            AuthError::Forbidden { .. } => ApiError::forbidden(e.to_string()),
            AuthError::SessionExpired => {
                ApiError::fail(StatusCode::UNAUTHORIZED, "session_expired", e.to_string())
            }
            AuthError::InvalidCredentials => {
                ApiError::fail(StatusCode::UNAUTHORIZED, "invalid_credentials", e.to_string())
            }
            AuthError::InvalidActivation => {
                ApiError::fail(StatusCode::BAD_REQUEST, "invalid_activation", e.to_string())
            }
            AuthError::EmailTaken => ApiError::conflict(e.to_string()),
            AuthError::Invalid(message) => ApiError::bad_request(message),
            AuthError::Cache(_) | AuthError::Session(_) => {
                tracing::warn!(error = %e, "Session backend unavailable");
                ApiError::unavailable("Session service unavailable, please retry")
            }
            AuthError::Password(_) => {
                tracing::error!(error = %e, "Password handling failed");
                ApiError::internal("Credential processing failed")
            }
            AuthError::Store(e) => ApiError::from(e),
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        ApiError::from(self).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fail_code(e: AuthError) -> (StatusCode, &'static str) {
        match ApiError::from(e) {
            ApiError::Fail { code, status, .. } => (status, code),
            other => panic!("expected fail, got {other:?}"),
        }
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(
            fail_code(AuthError::Unauthenticated(UnauthenticatedReason::NoSession)),
            (StatusCode::UNAUTHORIZED, "unauthenticated")
        );
        assert_eq!(
            fail_code(AuthError::Forbidden { role: Role::User }),
            (StatusCode::FORBIDDEN, "forbidden")
        );
        assert_eq!(
            fail_code(AuthError::SessionExpired),
            (StatusCode::UNAUTHORIZED, "session_expired")
        );
        assert_eq!(
            fail_code(AuthError::EmailTaken),
            (StatusCode::CONFLICT, "conflict")
        );
    }

    #[test]
    fn test_reason_is_not_exposed() {
        let e = AuthError::Unauthenticated(UnauthenticatedReason::InvalidToken(
            TokenError::InvalidSignature,
        ));
        assert_eq!(e.to_string(), "Please login to access this resource");
    }
}
