use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use axum_extra::extract::CookieJar;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::MessageResponse;
use crate::api::response::{ApiError, AppJson, JSend};
use crate::auth::credentials::{clear_credentials, extract_token, set_credentials};
use crate::auth::flows::{self, RegistrationRequest, SessionStart, SocialAuthRequest};
use crate::auth::CurrentPrincipal;
use crate::storage::models::Principal;
use crate::tokens::TokenKind;
use crate::AppState;

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionResponse {
    pub access_token: String,
    pub user: Principal,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RegistrationResponse {
    pub activation_token: String,
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct ActivationRequest {
    pub activation_code: String,
    pub activation_token: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

type SessionReply = (CookieJar, Json<JSend<SessionResponse>>);

/// Set both credential cookies and echo the access token for header-based
/// clients
fn session_reply(state: &AppState, jar: CookieJar, started: SessionStart) -> SessionReply {
    let jar = set_credentials(jar, &started.tokens, &state.codec, &state.config.cookies);
    (
        jar,
        JSend::success(SessionResponse {
            access_token: started.tokens.access,
            user: started.principal,
        }),
    )
}

// ============================================================================
// Handlers
// ============================================================================

pub async fn register(
    State(state): State<Arc<AppState>>,
    AppJson(req): AppJson<RegistrationRequest>,
) -> Result<(StatusCode, Json<JSend<RegistrationResponse>>), ApiError> {
    let email = req.email.trim().to_lowercase();
    let activation_token = flows::register(&state, req).await?;

    Ok((
        StatusCode::CREATED,
        JSend::success(RegistrationResponse {
            activation_token,
            message: format!("Please check {email} to activate your account"),
        }),
    ))
}

pub async fn activate_user(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    AppJson(req): AppJson<ActivationRequest>,
) -> Result<(StatusCode, CookieJar, Json<JSend<SessionResponse>>), ApiError> {
    let user = flows::activate(&state, &req.activation_token, &req.activation_code).await?;
    let started = flows::start_session(&state, &user).await?;
    let (jar, body) = session_reply(&state, jar, started);
    Ok((StatusCode::CREATED, jar, body))
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    AppJson(req): AppJson<LoginRequest>,
) -> Result<SessionReply, ApiError> {
    if req.email.trim().is_empty() || req.password.is_empty() {
        return Err(ApiError::bad_request("Please enter email and password"));
    }

    let user = flows::login(&state, &req.email, &req.password).await?;
    let started = flows::start_session(&state, &user).await?;
    Ok(session_reply(&state, jar, started))
}

pub async fn social_auth(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    AppJson(req): AppJson<SocialAuthRequest>,
) -> Result<SessionReply, ApiError> {
    let user = flows::social_auth(&state, req).await?;
    let started = flows::start_session(&state, &user).await?;
    Ok(session_reply(&state, jar, started))
}

pub async fn refresh(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    headers: HeaderMap,
) -> Result<SessionReply, ApiError> {
    let token = extract_token(TokenKind::Refresh, &jar, &headers);
    let started = flows::refresh(&state, token.as_deref()).await?;
    Ok(session_reply(&state, jar, started))
}

pub async fn logout(
    State(state): State<Arc<AppState>>,
    CurrentPrincipal(ctx): CurrentPrincipal,
    jar: CookieJar,
) -> Result<(CookieJar, Json<JSend<MessageResponse>>), ApiError> {
    flows::logout(&state, &ctx.principal.id).await?;
    Ok((
        clear_credentials(jar, &state.config.cookies),
        JSend::success(MessageResponse::new("Logged out successfully")),
    ))
}
