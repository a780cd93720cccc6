//! Authentication and authorization middleware.
//!
//! `authenticate` resolves the caller from the request credentials and
//! attaches an [`AuthContext`]; `authorize_roles` then checks the route's
//! [`RequiredRoles`]. Both short-circuit before the handler runs.

use axum::{
    body::Body,
    extract::{Request, State},
    http::Response,
    middleware::Next,
    response::IntoResponse,
};
use axum_extra::extract::CookieJar;
use std::sync::Arc;

use crate::auth::credentials::extract_token;
use crate::auth::{AuthContext, AuthError, RequiredRoles, UnauthenticatedReason};
use crate::tokens::TokenKind;
use crate::AppState;

pub async fn authenticate(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Response<Body> {
    let token = extract_token(TokenKind::Access, &jar, request.headers());

    match state.gate().authenticate(token.as_deref()).await {
        Ok(ctx) => {
            tracing::debug!(principal_id = %ctx.principal.id, "Authenticated request");
            request.extensions_mut().insert(ctx);
            next.run(request).await
        }
        Err(e) => e.into_response(),
    }
}

/// Role check for routes layered with `from_fn_with_state(RequiredRoles, ..)`.
/// Must run after [`authenticate`].
pub async fn authorize_roles(
    State(required): State<RequiredRoles>,
    request: Request,
    next: Next,
) -> Response<Body> {
    let Some(ctx) = request.extensions().get::<AuthContext>() else {
        return AuthError::Unauthenticated(UnauthenticatedReason::MissingToken).into_response();
    };

    match required.check(&ctx.principal) {
        Ok(()) => next.run(request).await,
        Err(e) => {
            tracing::debug!(
                principal_id = %ctx.principal.id,
                role = %ctx.principal.role,
                "Role not permitted on route"
            );
            e.into_response()
        }
    }
}
