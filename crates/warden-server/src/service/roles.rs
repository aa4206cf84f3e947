use std::sync::Arc;

use serde_json::json;
use tracing::warn;
use warden_core::event::{USER_ROLE_ASSIGN_SUCCESS, USER_ROLE_REMOVE_SUCCESS};
use warden_core::model::{Permission, Role};
use warden_events::EventSink;
use warden_storage::{RoleRepository, StorageError};

pub struct RoleService {
    roles: RoleRepository,
    publisher: Option<Arc<dyn EventSink>>,
}

impl RoleService {
    pub fn new(roles: RoleRepository, publisher: Option<Arc<dyn EventSink>>) -> Self {
        Self { roles, publisher }
    }

    pub async fn create_role(
        &self,
        name: &str,
        tenant_id: Option<&str>,
    ) -> Result<Role, StorageError> {
        self.roles.create(name, tenant_id).await
    }

    pub async fn assign_permissions(
        &self,
        role_id: &str,
        permissions: &[Permission],
    ) -> Result<(), StorageError> {
        self.roles.assign_permissions(role_id, permissions).await
    }

    pub async fn remove_permissions(
        &self,
        role_id: &str,
        permissions: &[Permission],
    ) -> Result<(), StorageError> {
        self.roles.remove_permissions(role_id, permissions).await
    }

    pub async fn sync_permissions(
        &self,
        role_id: &str,
        permissions: &[Permission],
    ) -> Result<(), StorageError> {
        self.roles.sync_permissions(role_id, permissions).await
    }

    pub async fn assign_users(
        &self,
        role_id: &str,
        user_ids: &[String],
    ) -> Result<(), StorageError> {
        self.roles.assign_users(role_id, user_ids).await?;
        self.announce(USER_ROLE_ASSIGN_SUCCESS, role_id, user_ids).await;
        Ok(())
    }

    pub async fn remove_users(
        &self,
        role_id: &str,
        user_ids: &[String],
    ) -> Result<(), StorageError> {
        self.roles.remove_users(role_id, user_ids).await?;
        self.announce(USER_ROLE_REMOVE_SUCCESS, role_id, user_ids).await;
        Ok(())
    }

    /// Best-effort completion notification after a direct mutation. The
    /// work is done and recorded; a failed publish is only logged.
    async fn announce(&self, event_type: &str, role_id: &str, user_ids: &[String]) {
        if let Some(publisher) = &self.publisher
            && let Err(e) = publisher
                .publish(event_type, json!({"role_id": role_id, "user_ids": user_ids}))
                .await
        {
            warn!(event_type, role_id, error = %e, "failed to publish completion event");
        }
    }
}
