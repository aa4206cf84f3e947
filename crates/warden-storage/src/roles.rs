//! Role storage: the role table, role-permission grants, and user-role
//! assignments.
//!
//! Bulk mutations run as a single UNNEST statement inside one transaction;
//! inserts de-duplicate with ON CONFLICT DO NOTHING so replays are
//! harmless.

use sqlx::PgPool;
use uuid::Uuid;
use warden_core::model::{Permission, Role};

use crate::error::StorageError;

#[derive(Debug, Clone)]
pub struct RoleRepository {
    pool: PgPool,
}

impl RoleRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(
        &self,
        name: &str,
        tenant_id: Option<&str>,
    ) -> Result<Role, StorageError> {
        let role = Role {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            tenant_id: tenant_id.map(str::to_string),
        };
        sqlx::query("INSERT INTO pmsn.role (id, name, tenant_id) VALUES ($1, $2, $3)")
            .bind(&role.id)
            .bind(&role.name)
            .bind(role.tenant_id.as_deref())
            .execute(&self.pool)
            .await?;
        Ok(role)
    }

    pub async fn assign_permissions(
        &self,
        role_id: &str,
        permissions: &[Permission],
    ) -> Result<(), StorageError> {
        if permissions.is_empty() {
            return Ok(());
        }
        let (resource_ids, action_ids) = split_permissions(permissions);

        let mut tx = self.pool.begin().await?;
        sqlx::query(
            r#"
            INSERT INTO pmsn.role_permission (role_id, resource_id, action_id)
            SELECT $1::text, resource_id, action_id
            FROM UNNEST($2::text[], $3::text[]) AS perm(resource_id, action_id)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(role_id)
        .bind(&resource_ids)
        .bind(&action_ids)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }

    pub async fn remove_permissions(
        &self,
        role_id: &str,
        permissions: &[Permission],
    ) -> Result<(), StorageError> {
        if permissions.is_empty() {
            return Ok(());
        }
        let (resource_ids, action_ids) = split_permissions(permissions);

        let mut tx = self.pool.begin().await?;
        sqlx::query(
            r#"
            DELETE FROM pmsn.role_permission
            WHERE role_id = $1
              AND (resource_id, action_id) IN (
                  SELECT resource_id, action_id
                  FROM UNNEST($2::text[], $3::text[]) AS perm(resource_id, action_id)
              )
            "#,
        )
        .bind(role_id)
        .bind(&resource_ids)
        .bind(&action_ids)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }

    /// Replace the role's grant set. Delete and insert share one
    /// transaction, so readers see either the old set or the new set in
    /// full.
    pub async fn sync_permissions(
        &self,
        role_id: &str,
        permissions: &[Permission],
    ) -> Result<(), StorageError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM pmsn.role_permission WHERE role_id = $1")
            .bind(role_id)
            .execute(&mut *tx)
            .await?;

        if !permissions.is_empty() {
            let (resource_ids, action_ids) = split_permissions(permissions);
            sqlx::query(
                r#"
                INSERT INTO pmsn.role_permission (role_id, resource_id, action_id)
                SELECT $1::text, resource_id, action_id
                FROM UNNEST($2::text[], $3::text[]) AS perm(resource_id, action_id)
                "#,
            )
            .bind(role_id)
            .bind(&resource_ids)
            .bind(&action_ids)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    pub async fn get_permissions(&self, role_id: &str) -> Result<Vec<Permission>, StorageError> {
        let rows: Vec<(String, String)> = sqlx::query_as(
            "SELECT resource_id, action_id FROM pmsn.role_permission WHERE role_id = $1",
        )
        .bind(role_id)
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

    pub async fn assign_users(
        &self,
        role_id: &str,
        user_ids: &[String],
    ) -> Result<(), StorageError> {
        if user_ids.is_empty() {
            return Ok(());
        }
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            r#"
            INSERT INTO pmsn.user_role (user_id, role_id)
            SELECT user_id, $1::text FROM UNNEST($2::text[]) AS u(user_id)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(role_id)
        .bind(user_ids)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }

    pub async fn remove_users(
        &self,
        role_id: &str,
        user_ids: &[String],
    ) -> Result<(), StorageError> {
        if user_ids.is_empty() {
            return Ok(());
        }
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM pmsn.user_role WHERE role_id = $1 AND user_id = ANY($2)")
            .bind(role_id)
            .bind(user_ids)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }
}

pub(crate) fn split_permissions(permissions: &[Permission]) -> (Vec<String>, Vec<String>) {
    permissions
        .iter()
        .map(|p| (p.resource_id.clone(), p.action_id.clone()))
        .unzip()
}
