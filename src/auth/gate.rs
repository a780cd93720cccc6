use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use tracing::{debug, warn};

use super::{AuthError, UnauthenticatedReason};
use crate::session::SessionStore;
use crate::storage::models::{Principal, Role};
use crate::tokens::{Claims, TokenCodec, TokenKind};

/// What a successful authentication attaches to the request
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub claims: Claims,
    pub principal: Principal,
}

/// Token verification followed by a live-session check
pub struct AuthGate<'a> {
    codec: &'a TokenCodec,
    sessions: &'a SessionStore,
}

impl<'a> AuthGate<'a> {
    pub fn new(codec: &'a TokenCodec, sessions: &'a SessionStore) -> Self {
        Self { codec, sessions }
    }

    /// Authenticate an access token. Any doubt about the session, including
    /// an unreachable backend, rejects the request.
    pub async fn authenticate(&self, token: Option<&str>) -> Result<AuthContext, AuthError> {
        let token = token.ok_or(AuthError::Unauthenticated(
            UnauthenticatedReason::MissingToken,
        ))?;

        let claims = self
            .codec
            .verify(token, TokenKind::Access)
            .map_err(|e| AuthError::Unauthenticated(UnauthenticatedReason::InvalidToken(e)))?;

        let record = match self.sessions.get(&claims.sub).await {
            Ok(Some(record)) => record,
            Ok(None) => {
                debug!(principal_id = %claims.sub, "No live session for token");
                return Err(AuthError::Unauthenticated(UnauthenticatedReason::NoSession));
            }
            Err(e) => {
                warn!(principal_id = %claims.sub, error = %e, "Session lookup failed, rejecting request");
                return Err(AuthError::Unauthenticated(
                    UnauthenticatedReason::BackendUnavailable,
                ));
            }
        };

        if record.sid != claims.sid {
            debug!(principal_id = %claims.sub, "Token belongs to a superseded session");
            return Err(AuthError::Unauthenticated(
                UnauthenticatedReason::SessionSuperseded,
            ));
        }

        Ok(AuthContext {
            claims,
            principal: record.principal,
        })
    }
}

/// Roles allowed on a route. The empty set admits any authenticated principal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequiredRoles(&'static [Role]);

impl RequiredRoles {
    pub const ADMIN: RequiredRoles = RequiredRoles(&[Role::Admin]);

    pub const fn any() -> Self {
        RequiredRoles(&[])
    }

    pub const fn only(roles: &'static [Role]) -> Self {
        RequiredRoles(roles)
    }

    pub fn permits(&self, role: Role) -> bool {
        self.0.is_empty() || self.0.contains(&role)
    }

    pub fn check(&self, principal: &Principal) -> Result<(), AuthError> {
        if self.permits(principal.role) {
            Ok(())
        } else {
            Err(AuthError::Forbidden {
                role: principal.role,
            })
        }
    }
}

/// Handler extractor for the principal attached by the authenticate middleware
#[derive(Debug, Clone)]
pub struct CurrentPrincipal(pub AuthContext);

impl<S> FromRequestParts<S> for CurrentPrincipal
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthContext>()
            .cloned()
            .map(CurrentPrincipal)
            .ok_or(AuthError::Unauthenticated(
                UnauthenticatedReason::MissingToken,
            ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::testutil::{make_user, FailingKv};
    use crate::tokens::{TokenError, TokenKey};
    use chrono::Duration as TokenTtl;
    use std::sync::Arc;
    use std::time::Duration;

    fn codec() -> TokenCodec {
        TokenCodec::new(
            TokenKey::new("access", TokenTtl::minutes(5)),
            TokenKey::new("refresh", TokenTtl::days(3)),
        )
    }

    fn sessions() -> SessionStore {
        SessionStore::new(
            Arc::new(MemoryCache::new()),
            Duration::from_secs(60),
            Duration::from_millis(50),
        )
    }

    fn reason(result: Result<AuthContext, AuthError>) -> UnauthenticatedReason {
        match result {
            Err(AuthError::Unauthenticated(reason)) => reason,
            other => panic!("expected unauthenticated, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_authenticates_live_session() {
        let (codec, sessions) = (codec(), sessions());
        let principal = make_user("u1", "a@example.com", Role::User).principal();
        sessions.put(&principal, "sid-1").await.unwrap();
        let token = codec.issue("u1", "sid-1", TokenKind::Access);

        let ctx = AuthGate::new(&codec, &sessions)
            .authenticate(Some(&token))
            .await
            .unwrap();
        assert_eq!(ctx.principal, principal);
        assert_eq!(ctx.claims.sid, "sid-1");
    }

    #[tokio::test]
    async fn test_missing_and_invalid_tokens() {
        let (codec, sessions) = (codec(), sessions());
        let gate = AuthGate::new(&codec, &sessions);

        assert_eq!(
            reason(gate.authenticate(None).await),
            UnauthenticatedReason::MissingToken
        );
        assert_eq!(
            reason(gate.authenticate(Some("garbage")).await),
            UnauthenticatedReason::InvalidToken(TokenError::Malformed)
        );

        // A refresh token is not an access token
        let refresh = codec.issue("u1", "sid-1", TokenKind::Refresh);
        assert_eq!(
            reason(gate.authenticate(Some(&refresh)).await),
            UnauthenticatedReason::InvalidToken(TokenError::InvalidSignature)
        );
    }

    #[tokio::test]
    async fn test_valid_token_without_session_is_rejected() {
        let (codec, sessions) = (codec(), sessions());
        let token = codec.issue("u1", "sid-1", TokenKind::Access);
        assert_eq!(
            reason(AuthGate::new(&codec, &sessions).authenticate(Some(&token)).await),
            UnauthenticatedReason::NoSession
        );
    }

    #[tokio::test]
    async fn test_revocation_is_immediate() {
        let (codec, sessions) = (codec(), sessions());
        let principal = make_user("u1", "a@example.com", Role::User).principal();
        sessions.put(&principal, "sid-1").await.unwrap();
        let token = codec.issue("u1", "sid-1", TokenKind::Access);
        let gate = AuthGate::new(&codec, &sessions);
        assert!(gate.authenticate(Some(&token)).await.is_ok());

        sessions.delete("u1").await.unwrap();
        assert_eq!(
            reason(gate.authenticate(Some(&token)).await),
            UnauthenticatedReason::NoSession
        );
    }

    #[tokio::test]
    async fn test_superseded_session_is_rejected() {
        let (codec, sessions) = (codec(), sessions());
        let principal = make_user("u1", "a@example.com", Role::User).principal();
        sessions.put(&principal, "first").await.unwrap();
        let old = codec.issue("u1", "first", TokenKind::Access);
        sessions.put(&principal, "second").await.unwrap();

        assert_eq!(
            reason(AuthGate::new(&codec, &sessions).authenticate(Some(&old)).await),
            UnauthenticatedReason::SessionSuperseded
        );
    }

    #[tokio::test]
    async fn test_fails_closed_when_backend_unavailable() {
        let codec = codec();
        let sessions = SessionStore::new(
            Arc::new(FailingKv),
            Duration::from_secs(60),
            Duration::from_millis(50),
        );
        let token = codec.issue("u1", "sid-1", TokenKind::Access);
        assert_eq!(
            reason(AuthGate::new(&codec, &sessions).authenticate(Some(&token)).await),
            UnauthenticatedReason::BackendUnavailable
        );
    }

    #[test]
    fn test_role_matrix() {
        let any = RequiredRoles::any();
        let admin = RequiredRoles::ADMIN;
        let both = RequiredRoles::only(&[Role::Admin, Role::User]);

        for role in [Role::Admin, Role::User] {
            assert!(any.permits(role));
            assert!(both.permits(role));
            assert_eq!(admin.permits(role), role == Role::Admin);
        }
    }

    #[test]
    fn test_check_reports_role() {
        let principal = make_user("u1", "a@example.com", Role::User).principal();
        assert!(matches!(
            RequiredRoles::ADMIN.check(&principal),
            Err(AuthError::Forbidden { role: Role::User })
        ));
        assert!(RequiredRoles::any().check(&principal).is_ok());
    }
}
