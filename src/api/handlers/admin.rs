use axum::extract::{Path, State};
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::PaginationParams;
use crate::api::response::{ApiError, AppJson, AppQuery, JSend, JSendPaginated};
use crate::auth::flows;
use crate::cache::{CollectionKey, EntityKind};
use crate::storage::models::{Course, Role, User, UserProfile};
use crate::storage::StoreError;
use crate::AppState;

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DeleteUserResponse {
    pub message: String,
    /// `false` when the session could not be ended; it then lasts until the
    /// session TTL runs out
    pub session_revoked: bool,
}

#[derive(Debug, Deserialize)]
pub struct UpdateRoleRequest {
    pub role: Role,
}

// ============================================================================
// Handlers
// ============================================================================

pub async fn health() -> Json<JSend<HealthResponse>> {
    JSend::success(HealthResponse {
        status: "healthy".to_string(),
    })
}

pub async fn list_admin_courses(
    State(state): State<Arc<AppState>>,
    AppQuery(params): AppQuery<PaginationParams>,
) -> Result<Json<JSendPaginated<Course>>, ApiError> {
    params.validate()?;

    let store = state.store.clone();
    let courses = state
        .reader
        .read_many(CollectionKey::AdminCourses, move || async move {
            store.list_courses().await
        })
        .await?;

    let (items, pagination) = params.page(courses);
    Ok(JSendPaginated::success(items, pagination))
}

pub async fn list_admin_users(
    State(state): State<Arc<AppState>>,
    AppQuery(params): AppQuery<PaginationParams>,
) -> Result<Json<JSendPaginated<UserProfile>>, ApiError> {
    params.validate()?;

    let store = state.store.clone();
    let users = state
        .reader
        .read_many(CollectionKey::AdminUsers, move || async move {
            let users = store.list_users().await?;
            Ok::<_, StoreError>(users.iter().map(User::profile).collect())
        })
        .await?;

    let (items, pagination) = params.page(users);
    Ok(JSendPaginated::success(items, pagination))
}

/// Change a user's role. A live session picks up the new role immediately.
pub async fn update_user_role(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    AppJson(req): AppJson<UpdateRoleRequest>,
) -> Result<Json<JSend<UserProfile>>, ApiError> {
    let role = req.role;
    let user = state
        .store
        .update_user(&id, move |user| {
            user.role = role;
            user.updated_at = Utc::now();
            Ok(())
        })
        .await?
        .ok_or_else(|| ApiError::not_found(format!("User {id} not found")))?;

    flows::user_written(&state, &user).await;
    tracing::info!(principal_id = %user.id, role = %role, "Role updated");

    Ok(JSend::success(user.profile()))
}

/// Delete a user and end their session
pub async fn delete_user(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<JSend<DeleteUserResponse>>, ApiError> {
    if !state.store.delete_user(&id).await? {
        return Err(ApiError::not_found(format!("User {id} not found")));
    }

    state
        .invalidator
        .entity_written(EntityKind::User, &id)
        .await;
    let session_revoked = flows::revoke_deleted(&state, &id).await;
    tracing::info!(principal_id = %id, session_revoked, "User deleted");

    let message = if session_revoked {
        "User deleted successfully"
    } else {
        "User deleted; their session could not be ended and expires on its own"
    };
    Ok(JSend::success(DeleteUserResponse {
        message: message.to_string(),
        session_revoked,
    }))
}
