use std::sync::Arc;

use serde_json::json;
use tracing::warn;
use warden_core::event::{USER_GROUP_ASSIGN_SUCCESS, USER_GROUP_REMOVE_SUCCESS};
use warden_core::model::{Group, Permission};
use warden_events::EventSink;
use warden_storage::{GroupRepository, StorageError};

pub struct GroupService {
    groups: GroupRepository,
    publisher: Option<Arc<dyn EventSink>>,
}

impl GroupService {
    pub fn new(groups: GroupRepository, publisher: Option<Arc<dyn EventSink>>) -> Self {
        Self { groups, publisher }
    }

    pub async fn create_group(
        &self,
        name: &str,
        tenant_id: Option<&str>,
    ) -> Result<Group, StorageError> {
        self.groups.create(name, tenant_id).await
    }

    pub async fn assign_permissions(
        &self,
        group_id: &str,
        permissions: &[Permission],
    ) -> Result<(), StorageError> {
        self.groups.assign_permissions(group_id, permissions).await
    }

    pub async fn remove_permissions(
        &self,
        group_id: &str,
        permissions: &[Permission],
    ) -> Result<(), StorageError> {
        self.groups.remove_permissions(group_id, permissions).await
    }

    pub async fn sync_permissions(
        &self,
        group_id: &str,
        permissions: &[Permission],
    ) -> Result<(), StorageError> {
        self.groups.sync_permissions(group_id, permissions).await
    }

    pub async fn assign_users(
        &self,
        group_id: &str,
        user_ids: &[String],
    ) -> Result<(), StorageError> {
        self.groups.assign_users(group_id, user_ids).await?;
        self.announce(USER_GROUP_ASSIGN_SUCCESS, group_id, user_ids).await;
        Ok(())
    }

    pub async fn remove_users(
        &self,
        group_id: &str,
        user_ids: &[String],
    ) -> Result<(), StorageError> {
        self.groups.remove_users(group_id, user_ids).await?;
        self.announce(USER_GROUP_REMOVE_SUCCESS, group_id, user_ids).await;
        Ok(())
    }

    async fn announce(&self, event_type: &str, group_id: &str, user_ids: &[String]) {
        if let Some(publisher) = &self.publisher
            && let Err(e) = publisher
                .publish(event_type, json!({"group_id": group_id, "user_ids": user_ids}))
                .await
        {
            warn!(event_type, group_id, error = %e, "failed to publish completion event");
        }
    }
}
