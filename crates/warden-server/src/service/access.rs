use std::collections::HashSet;

use warden_core::model::{Condition, Permission, PermissionCode};
use warden_storage::{PermissionRepository, ResourceRepository, StorageError};

/// The authorization query surface: the public permission check and the
/// management-gate check.
pub struct AccessService {
    evaluator: PermissionRepository,
    resources: ResourceRepository,
}

impl AccessService {
    pub fn new(evaluator: PermissionRepository, resources: ResourceRepository) -> Self {
        Self {
            evaluator,
            resources,
        }
    }

    /// "May this user perform these actions, in this tenant?"
    ///
    /// The effective set comes back in one statement; each requested code
    /// pair is resolved against the identity store, and an unknown code
    /// is an input error rather than a deny.
    pub async fn check_permission(
        &self,
        user_id: &str,
        tenant_id: Option<&str>,
        requested: &[PermissionCode],
        condition: Condition,
    ) -> Result<bool, StorageError> {
        let granted: HashSet<Permission> = self
            .evaluator
            .user_permissions(user_id, tenant_id)
            .await?
            .into_iter()
            .collect();

        let mut matches = 0;
        for code in requested {
            let permission = self.resources.resolve(code).await?;
            if granted.contains(&permission) {
                matches += 1;
            }
        }

        Ok(condition.decide(matches, requested.len()))
    }

    /// The three-way gate in front of management endpoints.
    pub async fn check_gate(
        &self,
        user_id: &str,
        tenant_id: Option<&str>,
        primary: &PermissionCode,
        associated: &PermissionCode,
    ) -> Result<bool, StorageError> {
        self.evaluator
            .check_gate(user_id, tenant_id, primary, associated)
            .await
    }

    pub async fn is_user_associated_with_tenant(
        &self,
        user_id: &str,
        tenant_id: &str,
    ) -> Result<bool, StorageError> {
        self.evaluator
            .is_user_associated_with_tenant(user_id, tenant_id)
            .await
    }
}
