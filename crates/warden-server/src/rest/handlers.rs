use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use warden_core::model::{Group, Role};

use super::AppState;
use super::types::*;
use crate::error::ApiError;

pub async fn check_permission(
    State(state): State<AppState>,
    Json(req): Json<CheckPermissionRequest>,
) -> Result<Json<CheckPermissionResponse>, ApiError> {
    let tenant_id = normalize_tenant(req.tenant_id);
    let allowed = state
        .access
        .check_permission(
            &req.user_id,
            tenant_id.as_deref(),
            &req.permissions,
            req.condition,
        )
        .await?;
    Ok(Json(CheckPermissionResponse { allowed }))
}

// ---------------------------------------------------------------------------
// Tenant permissions
// ---------------------------------------------------------------------------

pub async fn tenant_assign_permissions(
    State(state): State<AppState>,
    Json(req): Json<BulkTenantPermissionRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    state
        .tenants
        .assign_permissions(&req.tenant_id, &req.permissions)
        .await?;
    Ok(Json(MessageResponse {
        message: "permissions assigned successfully",
    }))
}

pub async fn tenant_remove_permissions(
    State(state): State<AppState>,
    Json(req): Json<BulkTenantPermissionRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    state
        .tenants
        .remove_permissions(&req.tenant_id, &req.permissions)
        .await?;
    Ok(Json(MessageResponse {
        message: "permissions removed successfully",
    }))
}

pub async fn tenant_sync_permissions(
    State(state): State<AppState>,
    Json(req): Json<BulkTenantPermissionRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    state
        .tenants
        .sync_permissions(&req.tenant_id, &req.permissions)
        .await?;
    Ok(Json(MessageResponse {
        message: "permissions synced successfully",
    }))
}

// ---------------------------------------------------------------------------
// Roles
// ---------------------------------------------------------------------------

pub async fn create_role(
    State(state): State<AppState>,
    Json(req): Json<CreateRoleRequest>,
) -> Result<(StatusCode, Json<Role>), ApiError> {
    let tenant_id = normalize_tenant(req.tenant_id);
    let role = state
        .roles
        .create_role(&req.name, tenant_id.as_deref())
        .await?;
    Ok((StatusCode::CREATED, Json(role)))
}

pub async fn role_assign_permissions(
    State(state): State<AppState>,
    Path(role_id): Path<String>,
    Json(req): Json<BulkPermissionRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    state.roles.assign_permissions(&role_id, &req.permissions).await?;
    Ok(Json(MessageResponse {
        message: "permissions assigned successfully",
    }))
}

pub async fn role_remove_permissions(
    State(state): State<AppState>,
    Path(role_id): Path<String>,
    Json(req): Json<BulkPermissionRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    state.roles.remove_permissions(&role_id, &req.permissions).await?;
    Ok(Json(MessageResponse {
        message: "permissions removed successfully",
    }))
}

pub async fn role_sync_permissions(
    State(state): State<AppState>,
    Path(role_id): Path<String>,
    Json(req): Json<BulkPermissionRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    state.roles.sync_permissions(&role_id, &req.permissions).await?;
    Ok(Json(MessageResponse {
        message: "permissions synced successfully",
    }))
}

pub async fn role_assign_users(
    State(state): State<AppState>,
    Path(role_id): Path<String>,
    Json(req): Json<BulkUserRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    state.roles.assign_users(&role_id, &req.user_ids).await?;
    Ok(Json(MessageResponse {
        message: "users assigned successfully",
    }))
}

pub async fn role_remove_users(
    State(state): State<AppState>,
    Path(role_id): Path<String>,
    Json(req): Json<BulkUserRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    state.roles.remove_users(&role_id, &req.user_ids).await?;
    Ok(Json(MessageResponse {
        message: "users removed successfully",
    }))
}

// ---------------------------------------------------------------------------
// Groups
// ---------------------------------------------------------------------------

pub async fn create_group(
    State(state): State<AppState>,
    Json(req): Json<CreateGroupRequest>,
) -> Result<(StatusCode, Json<Group>), ApiError> {
    let tenant_id = normalize_tenant(req.tenant_id);
    let group = state
        .groups
        .create_group(&req.name, tenant_id.as_deref())
        .await?;
    Ok((StatusCode::CREATED, Json(group)))
}

pub async fn group_assign_permissions(
    State(state): State<AppState>,
    Path(group_id): Path<String>,
    Json(req): Json<BulkPermissionRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    state.groups.assign_permissions(&group_id, &req.permissions).await?;
    Ok(Json(MessageResponse {
        message: "permissions assigned successfully",
    }))
}

pub async fn group_remove_permissions(
    State(state): State<AppState>,
    Path(group_id): Path<String>,
    Json(req): Json<BulkPermissionRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    state.groups.remove_permissions(&group_id, &req.permissions).await?;
    Ok(Json(MessageResponse {
        message: "permissions removed successfully",
    }))
}

pub async fn group_sync_permissions(
    State(state): State<AppState>,
    Path(group_id): Path<String>,
    Json(req): Json<BulkPermissionRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    state.groups.sync_permissions(&group_id, &req.permissions).await?;
    Ok(Json(MessageResponse {
        message: "permissions synced successfully",
    }))
}

pub async fn group_assign_users(
    State(state): State<AppState>,
    Path(group_id): Path<String>,
    Json(req): Json<BulkUserRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    state.groups.assign_users(&group_id, &req.user_ids).await?;
    Ok(Json(MessageResponse {
        message: "users assigned successfully",
    }))
}

pub async fn group_remove_users(
    State(state): State<AppState>,
    Path(group_id): Path<String>,
    Json(req): Json<BulkUserRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    state.groups.remove_users(&group_id, &req.user_ids).await?;
    Ok(Json(MessageResponse {
        message: "users removed successfully",
    }))
}
