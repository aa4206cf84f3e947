//! Resources and actions: the two halves of a permission name.
//!
//! Both are operator-created (typically at seed time) and immutable
//! afterwards as far as this service is concerned.

use sqlx::PgPool;
use uuid::Uuid;
use warden_core::model::{Action, Permission, PermissionCode, Resource};

use crate::error::StorageError;

#[derive(Debug, Clone)]
pub struct ResourceRepository {
    pool: PgPool,
}

impl ResourceRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create_resource(
        &self,
        code: &str,
        name: &str,
        description: &str,
    ) -> Result<Resource, StorageError> {
        let resource = Resource {
            id: Uuid::new_v4().to_string(),
            code: code.to_string(),
            name: name.to_string(),
            description: description.to_string(),
        };
        sqlx::query("INSERT INTO pmsn.resource (id, code, name, description) VALUES ($1, $2, $3, $4)")
            .bind(&resource.id)
            .bind(&resource.code)
            .bind(&resource.name)
            .bind(&resource.description)
            .execute(&self.pool)
            .await?;
        Ok(resource)
    }

    pub async fn create_action(
        &self,
        resource_id: &str,
        code: &str,
        name: &str,
        description: &str,
    ) -> Result<Action, StorageError> {
        let action = Action {
            id: Uuid::new_v4().to_string(),
            resource_id: resource_id.to_string(),
            code: code.to_string(),
            name: name.to_string(),
            description: description.to_string(),
        };
        sqlx::query(
            "INSERT INTO pmsn.action (id, resource_id, code, name, description) VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(&action.id)
        .bind(&action.resource_id)
        .bind(&action.code)
        .bind(&action.name)
        .bind(&action.description)
        .execute(&self.pool)
        .await?;
        Ok(action)
    }

    pub async fn get_resource_by_code(&self, code: &str) -> Result<Resource, StorageError> {
        let row: Option<(String, String, String, String)> = sqlx::query_as(
            "SELECT id, code, name, description FROM pmsn.resource WHERE code = $1",
        )
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some((id, code, name, description)) => Ok(Resource {
                id,
                code,
                name,
                description,
            }),
            None => Err(StorageError::UnknownResourceCode(code.to_string())),
        }
    }

    pub async fn get_action_by_code(
        &self,
        resource_id: &str,
        resource_code: &str,
        action_code: &str,
    ) -> Result<Action, StorageError> {
        let row: Option<(String, String, String, String, String)> = sqlx::query_as(
            "SELECT id, resource_id, code, name, description FROM pmsn.action WHERE resource_id = $1 AND code = $2",
        )
        .bind(resource_id)
        .bind(action_code)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some((id, resource_id, code, name, description)) => Ok(Action {
                id,
                resource_id,
                code,
                name,
                description,
            }),
            None => Err(StorageError::UnknownActionCode {
                resource: resource_code.to_string(),
                action: action_code.to_string(),
            }),
        }
    }

    /// Resolve a `(resource_code, action_code)` pair to permission ids.
    /// Unknown codes are invalid input, never a silent deny.
    pub async fn resolve(&self, code: &PermissionCode) -> Result<Permission, StorageError> {
        let resource = self.get_resource_by_code(&code.resource_code).await?;
        let action = self
            .get_action_by_code(&resource.id, &code.resource_code, &code.action_code)
            .await?;
        Ok(Permission {
            resource_id: resource.id,
            action_id: action.id,
        })
    }
}
