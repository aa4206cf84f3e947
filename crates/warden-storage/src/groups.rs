//! Group storage. Structurally the mirror of role storage over the
//! `"group"`, `group_permission`, and `user_group` tables. `group` is a
//! reserved word in Postgres, hence the quoting.

use sqlx::PgPool;
use uuid::Uuid;
use warden_core::model::{Group, Permission};

use crate::error::StorageError;
use crate::roles::split_permissions;

#[derive(Debug, Clone)]
pub struct GroupRepository {
    pool: PgPool,
}

impl GroupRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(
        &self,
        name: &str,
        tenant_id: Option<&str>,
    ) -> Result<Group, StorageError> {
        let group = Group {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            tenant_id: tenant_id.map(str::to_string),
        };
        sqlx::query(r#"INSERT INTO pmsn."group" (id, name, tenant_id) VALUES ($1, $2, $3)"#)
            .bind(&group.id)
            .bind(&group.name)
            .bind(group.tenant_id.as_deref())
            .execute(&self.pool)
            .await?;
        Ok(group)
    }

    pub async fn assign_permissions(
        &self,
        group_id: &str,
        permissions: &[Permission],
    ) -> Result<(), StorageError> {
        if permissions.is_empty() {
            return Ok(());
        }
        let (resource_ids, action_ids) = split_permissions(permissions);

        let mut tx = self.pool.begin().await?;
        sqlx::query(
            r#"
            INSERT INTO pmsn.group_permission (group_id, resource_id, action_id)
            SELECT $1::text, resource_id, action_id
            FROM UNNEST($2::text[], $3::text[]) AS perm(resource_id, action_id)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(group_id)
        .bind(&resource_ids)
        .bind(&action_ids)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }

    pub async fn remove_permissions(
        &self,
        group_id: &str,
        permissions: &[Permission],
    ) -> Result<(), StorageError> {
        if permissions.is_empty() {
            return Ok(());
        }
        let (resource_ids, action_ids) = split_permissions(permissions);

        let mut tx = self.pool.begin().await?;
        sqlx::query(
            r#"
            DELETE FROM pmsn.group_permission
            WHERE group_id = $1
              AND (resource_id, action_id) IN (
                  SELECT resource_id, action_id
                  FROM UNNEST($2::text[], $3::text[]) AS perm(resource_id, action_id)
              )
            "#,
        )
        .bind(group_id)
        .bind(&resource_ids)
        .bind(&action_ids)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }

    pub async fn sync_permissions(
        &self,
        group_id: &str,
        permissions: &[Permission],
    ) -> Result<(), StorageError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM pmsn.group_permission WHERE group_id = $1")
            .bind(group_id)
            .execute(&mut *tx)
            .await?;

        if !permissions.is_empty() {
            let (resource_ids, action_ids) = split_permissions(permissions);
            sqlx::query(
                r#"
                INSERT INTO pmsn.group_permission (group_id, resource_id, action_id)
                SELECT $1::text, resource_id, action_id
                FROM UNNEST($2::text[], $3::text[]) AS perm(resource_id, action_id)
                "#,
            )
            .bind(group_id)
            .bind(&resource_ids)
            .bind(&action_ids)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    pub async fn get_permissions(&self, group_id: &str) -> Result<Vec<Permission>, StorageError> {
        let rows: Vec<(String, String)> = sqlx::query_as(
            "SELECT resource_id, action_id FROM pmsn.group_permission WHERE group_id = $1",
        )
        .bind(group_id)
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
        group_id: &str,
        user_ids: &[String],
    ) -> Result<(), StorageError> {
        if user_ids.is_empty() {
            return Ok(());
        }
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            r#"
            INSERT INTO pmsn.user_group (user_id, group_id)
            SELECT user_id, $1::text FROM UNNEST($2::text[]) AS u(user_id)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(group_id)
        .bind(user_ids)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }

    pub async fn remove_users(
        &self,
        group_id: &str,
        user_ids: &[String],
    ) -> Result<(), StorageError> {
        if user_ids.is_empty() {
            return Ok(());
        }
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM pmsn.user_group WHERE group_id = $1 AND user_id = ANY($2)")
            .bind(group_id)
            .bind(user_ids)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }
}
