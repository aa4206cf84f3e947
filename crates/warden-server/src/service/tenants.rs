use warden_core::model::Permission;
use warden_storage::{StorageError, TenantRepository};

pub struct TenantService {
    tenants: TenantRepository,
}

impl TenantService {
    pub fn new(tenants: TenantRepository) -> Self {
        Self { tenants }
    }

    pub async fn assign_permissions(
        &self,
        tenant_id: &str,
        permissions: &[Permission],
    ) -> Result<(), StorageError> {
        self.tenants.assign_permissions(tenant_id, permissions).await
    }

    pub async fn remove_permissions(
        &self,
        tenant_id: &str,
        permissions: &[Permission],
    ) -> Result<(), StorageError> {
        self.tenants.remove_permissions(tenant_id, permissions).await
    }

    pub async fn sync_permissions(
        &self,
        tenant_id: &str,
        permissions: &[Permission],
    ) -> Result<(), StorageError> {
        self.tenants.sync_permissions(tenant_id, permissions).await
    }
}
