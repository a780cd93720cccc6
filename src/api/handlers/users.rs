use axum::extract::State;
use axum::Json;
use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;

use crate::api::response::{ApiError, AppJson, JSend};
use crate::auth::flows;
use crate::auth::CurrentPrincipal;
use crate::cache::EntityKind;
use crate::storage::models::{AssetRef, UserProfile};
use crate::storage::StoreError;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct UpdateProfileRequest {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdatePasswordRequest {
    pub new_password: String,
    pub old_password: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateAvatarRequest {
    pub public_id: String,
    pub url: String,
}

/// Profile of the caller, served through the cache
pub async fn get_me(
    State(state): State<Arc<AppState>>,
    CurrentPrincipal(ctx): CurrentPrincipal,
) -> Result<Json<JSend<UserProfile>>, ApiError> {
    let store = state.store.clone();
    let profile = state
        .reader
        .read_one(EntityKind::User, &ctx.principal.id, move |id| async move {
            Ok::<_, StoreError>(store.get_user(&id).await?.map(|user| user.profile()))
        })
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    Ok(JSend::success(profile))
}

pub async fn update_me(
    State(state): State<Arc<AppState>>,
    CurrentPrincipal(ctx): CurrentPrincipal,
    AppJson(req): AppJson<UpdateProfileRequest>,
) -> Result<Json<JSend<UserProfile>>, ApiError> {
    let email = req.email.as_deref().map(flows::normalize_email).transpose()?;
    let name = match req.name.as_deref().map(str::trim) {
        Some("") => return Err(ApiError::bad_request("Name cannot be empty")),
        other => other.map(str::to_string),
    };

    let user = state
        .store
        .update_user(&ctx.principal.id, move |user| {
            if let Some(email) = email {
                user.email = email;
            }
            if let Some(name) = name {
                user.name = name;
            }
            user.updated_at = Utc::now();
            Ok(())
        })
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    flows::user_written(&state, &user).await;
    Ok(JSend::success(user.profile()))
}

pub async fn update_password(
    State(state): State<Arc<AppState>>,
    CurrentPrincipal(ctx): CurrentPrincipal,
    AppJson(req): AppJson<UpdatePasswordRequest>,
) -> Result<Json<JSend<UserProfile>>, ApiError> {
    let user =
        flows::change_password(&state, &ctx.principal.id, &req.old_password, &req.new_password)
            .await?;
    Ok(JSend::success(user.profile()))
}

pub async fn update_avatar(
    State(state): State<Arc<AppState>>,
    CurrentPrincipal(ctx): CurrentPrincipal,
    AppJson(req): AppJson<UpdateAvatarRequest>,
) -> Result<Json<JSend<UserProfile>>, ApiError> {
    if req.url.trim().is_empty() {
        return Err(ApiError::bad_request("Avatar url cannot be empty"));
    }

    let user = state
        .store
        .update_user(&ctx.principal.id, move |user| {
            user.avatar = Some(AssetRef {
                public_id: req.public_id,
                url: req.url,
            });
            user.updated_at = Utc::now();
            Ok(())
        })
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    flows::user_written(&state, &user).await;
    Ok(JSend::success(user.profile()))
}
