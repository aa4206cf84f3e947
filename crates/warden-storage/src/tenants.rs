//! Tenant-enabled permission pairs: the `resource_action_tenant` set.
//! Presence of a triple means the permission is offered to that tenant.

use sqlx::PgPool;
use warden_core::model::Permission;

use crate::error::StorageError;
use crate::roles::split_permissions;

#[derive(Debug, Clone)]
pub struct TenantRepository {
    pool: PgPool,
}

impl TenantRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn assign_permissions(
        &self,
        tenant_id: &str,
        permissions: &[Permission],
    ) -> Result<(), StorageError> {
        if permissions.is_empty() {
            return Ok(());
        }
        let (resource_ids, action_ids) = split_permissions(permissions);

        let mut tx = self.pool.begin().await?;
        sqlx::query(
            r#"
            INSERT INTO pmsn.resource_action_tenant (resource_id, action_id, tenant_id)
            SELECT resource_id, action_id, $1::text
            FROM UNNEST($2::text[], $3::text[]) AS perm(resource_id, action_id)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(tenant_id)
        .bind(&resource_ids)
        .bind(&action_ids)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }

    pub async fn remove_permissions(
        &self,
        tenant_id: &str,
        permissions: &[Permission],
    ) -> Result<(), StorageError> {
        if permissions.is_empty() {
            return Ok(());
        }
        let (resource_ids, action_ids) = split_permissions(permissions);

        let mut tx = self.pool.begin().await?;
        sqlx::query(
            r#"
            DELETE FROM pmsn.resource_action_tenant
            WHERE tenant_id = $1
              AND (resource_id, action_id) IN (
                  SELECT resource_id, action_id
                  FROM UNNEST($2::text[], $3::text[]) AS perm(resource_id, action_id)
              )
            "#,
        )
        .bind(tenant_id)
        .bind(&resource_ids)
        .bind(&action_ids)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }

    /// Replace the tenant's enabled set atomically.
    pub async fn sync_permissions(
        &self,
        tenant_id: &str,
        permissions: &[Permission],
    ) -> Result<(), StorageError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM pmsn.resource_action_tenant WHERE tenant_id = $1")
            .bind(tenant_id)
            .execute(&mut *tx)
            .await?;

        if !permissions.is_empty() {
            let (resource_ids, action_ids) = split_permissions(permissions);
            sqlx::query(
                r#"
                INSERT INTO pmsn.resource_action_tenant (resource_id, action_id, tenant_id)
                SELECT resource_id, action_id, $1::text
                FROM UNNEST($2::text[], $3::text[]) AS perm(resource_id, action_id)
                "#,
            )
            .bind(tenant_id)
            .bind(&resource_ids)
            .bind(&action_ids)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    pub async fn get_permissions(&self, tenant_id: &str) -> Result<Vec<Permission>, StorageError> {
        let rows: Vec<(String, String)> = sqlx::query_as(
            "SELECT resource_id, action_id FROM pmsn.resource_action_tenant WHERE tenant_id = $1",
        )
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|(resource_id, action_id)| Permission {
                resource_id,
                action_id,
            })
            .collect())
    }
}
