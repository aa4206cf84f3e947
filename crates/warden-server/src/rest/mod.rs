//! The HTTP surface, all under `/api/v1`.
//!
//! `/check-permission` is the public authorization query and is not
//! gated. Every management route sits behind the permission gate with a
//! per-endpoint `(primary, associated)` code pair.

mod handlers;
pub mod types;

use std::sync::Arc;

use axum::Router;
use axum::middleware::from_fn_with_state;
use axum::routing::{post, put};
use warden_core::model::PermissionCode;

use crate::middleware::{PermissionGate, require_permission};
use crate::service::{AccessService, GroupService, RoleService, TenantService};

#[derive(Clone)]
pub struct AppState {
    pub tenants: Arc<TenantService>,
    pub roles: Arc<RoleService>,
    pub groups: Arc<GroupService>,
    pub access: Arc<AccessService>,
}

pub fn create_router(state: AppState) -> Router {
    let tenant_gate = PermissionGate::new(
        Arc::clone(&state.access),
        PermissionCode::new("tenant", "manage"),
        PermissionCode::new("tenant", "manage"),
    );
    let role_gate = PermissionGate::new(
        Arc::clone(&state.access),
        PermissionCode::new("role", "manage"),
        PermissionCode::new("role", "manage_tenant_associated"),
    );
    let group_gate = PermissionGate::new(
        Arc::clone(&state.access),
        PermissionCode::new("group", "manage"),
        PermissionCode::new("group", "manage_tenant_associated"),
    );

    let tenant_routes = Router::new()
        // /bulk is the deprecated alias of /add
        .route("/tenant/permissions/bulk", post(handlers::tenant_assign_permissions))
        .route("/tenant/permissions/add", post(handlers::tenant_assign_permissions))
        .route("/tenant/permissions/remove", post(handlers::tenant_remove_permissions))
        .route("/tenant/permissions", put(handlers::tenant_sync_permissions))
        .route_layer(from_fn_with_state(tenant_gate, require_permission));

    let role_routes = Router::new()
        .route("/roles", post(handlers::create_role))
        .route("/roles/{role_id}/permissions/bulk", post(handlers::role_assign_permissions))
        .route("/roles/{role_id}/permissions/add", post(handlers::role_assign_permissions))
        .route("/roles/{role_id}/permissions/remove", post(handlers::role_remove_permissions))
        .route("/roles/{role_id}/permissions", put(handlers::role_sync_permissions))
        .route(
            "/roles/{role_id}/users/bulk",
            post(handlers::role_assign_users).delete(handlers::role_remove_users),
        )
        .route_layer(from_fn_with_state(role_gate, require_permission));

    let group_routes = Router::new()
        .route("/groups", post(handlers::create_group))
        .route("/groups/{group_id}/permissions/bulk", post(handlers::group_assign_permissions))
        .route("/groups/{group_id}/permissions/add", post(handlers::group_assign_permissions))
        .route("/groups/{group_id}/permissions/remove", post(handlers::group_remove_permissions))
        .route("/groups/{group_id}/permissions", put(handlers::group_sync_permissions))
        .route(
            "/groups/{group_id}/users/bulk",
            post(handlers::group_assign_users).delete(handlers::group_remove_users),
        )
        .route_layer(from_fn_with_state(group_gate, require_permission));

    let api = Router::new()
        .route("/check-permission", post(handlers::check_permission))
        .merge(tenant_routes)
        .merge(role_routes)
        .merge(group_routes);

    Router::new().nest("/api/v1", api).with_state(state)
}
