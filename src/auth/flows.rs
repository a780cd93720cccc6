//! Session lifecycle flows. Each session is bound to a fresh `sid` minted at
//! login; every token carries it, so starting a new session invalidates all
//! tokens of the previous one.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use tracing::{debug, info, warn};

use super::{AuthError, UnauthenticatedReason};
use crate::cache::{bounded, CacheError, EntityKind};
use crate::mail::activation_mail;
use crate::storage::models::{AssetRef, Principal, Role, User};
use crate::tokens::{
    generate_activation_code, generate_hex, generate_id, generate_sid, hash_password_blocking,
    verify_password_blocking, TokenKind, TokenPair,
};
use crate::AppState;

pub const MIN_PASSWORD_LEN: usize = 6;

/// A started or rotated session: the snapshot it holds and fresh tokens
#[derive(Debug, Clone)]
pub struct SessionStart {
    pub principal: Principal,
    pub tokens: TokenPair,
}

/// Start a new session for `user`, superseding any previous one
pub async fn start_session(state: &AppState, user: &User) -> Result<SessionStart, AuthError> {
    let principal = user.principal();
    let sid = generate_sid();
    state.sessions.put(&principal, &sid).await?;
    let tokens = state.codec.issue_pair(&principal.id, &sid);
    info!(principal_id = %principal.id, "Session started");
    Ok(SessionStart { principal, tokens })
}

/// Rotate both tokens of a live session. The principal is re-read from the
/// store so role and entitlement changes take effect.
pub async fn refresh(state: &AppState, token: Option<&str>) -> Result<SessionStart, AuthError> {
    let token = token.ok_or(AuthError::Unauthenticated(
        UnauthenticatedReason::MissingToken,
    ))?;
    let claims = state
        .codec
        .verify(token, TokenKind::Refresh)
        .map_err(|e| AuthError::Unauthenticated(UnauthenticatedReason::InvalidToken(e)))?;

    let record = match state.sessions.get(&claims.sub).await {
        Ok(Some(record)) => record,
        Ok(None) => return Err(AuthError::SessionExpired),
        Err(e) => {
            warn!(principal_id = %claims.sub, error = %e, "Session lookup failed during refresh");
            return Err(AuthError::Unauthenticated(
                UnauthenticatedReason::BackendUnavailable,
            ));
        }
    };
    if record.sid != claims.sid {
        debug!(principal_id = %claims.sub, "Refresh token of a superseded session");
        return Err(AuthError::SessionExpired);
    }

    let Some(user) = state.store.get_user(&claims.sub).await? else {
        if let Err(e) = state.sessions.delete(&claims.sub).await {
            warn!(principal_id = %claims.sub, error = %e, "Failed to drop session of deleted user");
        }
        return Err(AuthError::SessionExpired);
    };

    let principal = user.principal();
    // A logout or revocation since the lookup wins over this refresh
    if !state.sessions.renew(&principal, &record.sid).await? {
        debug!(principal_id = %principal.id, "Session ended while refreshing");
        return Err(AuthError::SessionExpired);
    }
    let tokens = state.codec.issue_pair(&principal.id, &record.sid);
    debug!(principal_id = %principal.id, "Session refreshed");
    Ok(SessionStart { principal, tokens })
}

pub async fn logout(state: &AppState, principal_id: &str) -> Result<(), AuthError> {
    state.sessions.delete(principal_id).await?;
    info!(principal_id = %principal_id, "Logged out");
    Ok(())
}

/// End the session of another principal; takes effect on their next request
pub async fn revoke(state: &AppState, principal_id: &str) -> Result<bool, AuthError> {
    let revoked = state.sessions.delete(principal_id).await?;
    if revoked {
        info!(principal_id = %principal_id, "Session revoked");
    }
    Ok(revoked)
}

const REVOKE_ATTEMPTS: u32 = 2;

/// End the session of a principal whose user record is already deleted. The
/// delete stands either way; returns whether the session is known to be gone.
pub async fn revoke_deleted(state: &AppState, principal_id: &str) -> bool {
    for attempt in 1..=REVOKE_ATTEMPTS {
        match revoke(state, principal_id).await {
            Ok(_) => return true,
            Err(e) => warn!(
                principal_id = %principal_id,
                attempt,
                error = %e,
                "Failed to revoke session of deleted user"
            ),
        }
    }
    false
}

/// Propagate an accepted user write: evict cached copies and refresh the
/// session snapshot. Failures are logged; the write itself has succeeded.
pub async fn user_written(state: &AppState, user: &User) {
    state
        .invalidator
        .entity_written(EntityKind::User, &user.id)
        .await;
    match state.sessions.replace_snapshot(&user.principal()).await {
        Ok(replaced) => debug!(principal_id = %user.id, replaced, "Session snapshot synced"),
        Err(e) => warn!(principal_id = %user.id, error = %e, "Failed to sync session snapshot"),
    }
}

// ============================================================================
// Credentials
// ============================================================================

pub fn normalize_email(email: &str) -> Result<String, AuthError> {
    let email = email.trim().to_lowercase();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(email),
        _ => Err(AuthError::Invalid("Please enter a valid email".to_string())),
    }
}

pub fn validate_password(password: &str) -> Result<(), AuthError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AuthError::Invalid(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}

fn validate_name(name: &str) -> Result<String, AuthError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(AuthError::Invalid("Please enter your name".to_string()));
    }
    Ok(name.to_string())
}

/// Check an email/password pair against the stored hash
pub async fn login(state: &AppState, email: &str, password: &str) -> Result<User, AuthError> {
    let email = email.trim().to_lowercase();
    let Some(user) = state.store.find_user_by_email(&email).await? else {
        return Err(AuthError::InvalidCredentials);
    };
    // Social-auth accounts have no password
    let Some(hash) = user.password_hash.clone() else {
        return Err(AuthError::InvalidCredentials);
    };
    if !verify_password_blocking(password.to_string(), hash).await? {
        return Err(AuthError::InvalidCredentials);
    }
    Ok(user)
}

/// Replace the password of `user_id` after checking the current one
pub async fn change_password(
    state: &AppState,
    user_id: &str,
    old_password: &str,
    new_password: &str,
) -> Result<User, AuthError> {
    validate_password(new_password)?;
    let Some(mut user) = state.store.get_user(user_id).await? else {
        return Err(AuthError::SessionExpired);
    };
    let Some(hash) = user.password_hash.clone() else {
        return Err(AuthError::Invalid(
            "This account signs in through a social provider".to_string(),
        ));
    };
    if !verify_password_blocking(old_password.to_string(), hash).await? {
        return Err(AuthError::Invalid("Invalid old password".to_string()));
    }

    user.password_hash = Some(hash_password_blocking(new_password.to_string()).await?);
    user.updated_at = Utc::now();
    let user = state.store.put_user(user).await?;
    user_written(state, &user).await;
    Ok(user)
}

// ============================================================================
// Registration
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct RegistrationRequest {
    pub email: String,
    pub name: String,
    pub password: String,
}

/// A registration awaiting its activation code
#[derive(Debug, Clone, Serialize, Deserialize)]
struct PendingRegistration {
    code: String,
    email: String,
    name: String,
    password_hash: String,
}

pub fn activation_key(token: &str) -> String {
    format!("activation:{token}")
}

/// Park a registration under a fresh activation token and mail its code.
/// Returns the activation token.
pub async fn register(state: &AppState, request: RegistrationRequest) -> Result<String, AuthError> {
    let email = normalize_email(&request.email)?;
    let name = validate_name(&request.name)?;
    validate_password(&request.password)?;

    if state.store.find_user_by_email(&email).await?.is_some() {
        return Err(AuthError::EmailTaken);
    }

    let pending = PendingRegistration {
        code: generate_activation_code(),
        email,
        name,
        password_hash: hash_password_blocking(request.password).await?,
    };
    let token = generate_hex(32);
    let data = serde_json::to_vec(&pending).map_err(CacheError::from)?;
    bounded(
        state.config.cache.op_timeout(),
        state.kv.set(
            &activation_key(&token),
            data,
            state.config.tokens.activation_ttl(),
        ),
    )
    .await?;

    state
        .mailer
        .send(activation_mail(&pending.email, &pending.name, &pending.code));
    info!(email = %pending.email, "Registration pending activation");
    Ok(token)
}

/// Redeem an activation token + code, creating the verified user.
/// A token can be redeemed once.
pub async fn activate(state: &AppState, token: &str, code: &str) -> Result<User, AuthError> {
    let key = activation_key(token);
    let timeout = state.config.cache.op_timeout();

    let data = bounded(timeout, state.kv.get(&key))
        .await?
        .ok_or(AuthError::InvalidActivation)?;
    let pending: PendingRegistration = serde_json::from_slice(&data).map_err(|e| {
        warn!(error = %e, "Discarding undecodable pending registration");
        AuthError::InvalidActivation
    })?;
    if !bool::from(pending.code.as_bytes().ct_eq(code.trim().as_bytes())) {
        return Err(AuthError::InvalidActivation);
    }
    // Whoever deletes the entry owns the activation
    if !bounded(timeout, state.kv.delete(&key)).await? {
        return Err(AuthError::InvalidActivation);
    }

    let now = Utc::now();
    let user = User {
        avatar: None,
        courses: Vec::new(),
        created_at: now,
        email: pending.email,
        id: generate_id(),
        is_verified: true,
        name: pending.name,
        password_hash: Some(pending.password_hash),
        role: Role::User,
        updated_at: now,
    };
    let user = state.store.put_user(user).await.map_err(|e| {
        if e.is_conflict() {
            AuthError::EmailTaken
        } else {
            AuthError::Store(e)
        }
    })?;
    state.invalidator.collection_changed(EntityKind::User).await;
    info!(principal_id = %user.id, "User activated");
    Ok(user)
}

// ============================================================================
// Social auth
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct SocialAuthRequest {
    pub avatar: Option<String>,
    pub email: String,
    pub name: String,
}

/// Find the user by email or create a password-less one
pub async fn social_auth(state: &AppState, request: SocialAuthRequest) -> Result<User, AuthError> {
    let email = normalize_email(&request.email)?;
    if let Some(user) = state.store.find_user_by_email(&email).await? {
        return Ok(user);
    }

    let now = Utc::now();
    let user = User {
        avatar: request.avatar.map(|url| AssetRef {
            public_id: String::new(),
            url,
        }),
        courses: Vec::new(),
        created_at: now,
        email: email.clone(),
        id: generate_id(),
        is_verified: true,
        name: validate_name(&request.name)?,
        password_hash: None,
        role: Role::User,
        updated_at: now,
    };
    match state.store.put_user(user).await {
        Ok(user) => {
            state.invalidator.collection_changed(EntityKind::User).await;
            info!(principal_id = %user.id, "User created through social auth");
            Ok(user)
        }
        // Lost a race with a concurrent first sign-in
        Err(e) if e.is_conflict() => state
            .store
            .find_user_by_email(&email)
            .await?
            .ok_or(AuthError::Store(e)),
        Err(e) => Err(AuthError::Store(e)),
    }
}
