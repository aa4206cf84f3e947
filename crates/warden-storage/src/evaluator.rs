//! The permission evaluator: read-only decision procedures over the
//! identity store.
//!
//! A user's effective permission set is the union of grants reached
//! through roles and groups. Subjects with a NULL tenant are global: their
//! grants apply everywhere and skip the `resource_action_tenant` gate.
//! When a tenant is named, tenant-scoped and global subjects both count,
//! but the union is filtered to pairs enabled for that tenant. The gate
//! table itself is tenant-keyed; NULL is never a match on that side.

use sqlx::PgPool;
use warden_core::model::{Permission, PermissionCode};

use crate::error::StorageError;

/// Effective set when no tenant is named: global subjects only, no
/// enablement filter.
const GLOBAL_PERMISSIONS_SQL: &str = r#"
    SELECT DISTINCT resource_id, action_id FROM (
        SELECT rp.resource_id, rp.action_id
        FROM pmsn.user_role ur
        JOIN pmsn.role r ON ur.role_id = r.id
        JOIN pmsn.role_permission rp ON r.id = rp.role_id
        WHERE ur.user_id = $1 AND r.tenant_id IS NULL

        UNION

        SELECT gp.resource_id, gp.action_id
        FROM pmsn.user_group ug
        JOIN pmsn."group" g ON ug.group_id = g.id
        JOIN pmsn.group_permission gp ON g.id = gp.group_id
        WHERE ug.user_id = $1 AND g.tenant_id IS NULL
    ) p
"#;

/// Effective set for a named tenant: tenant-or-global subjects, filtered
/// by the tenant-enabled pairs.
const TENANT_PERMISSIONS_SQL: &str = r#"
    SELECT DISTINCT p.resource_id, p.action_id FROM (
        SELECT rp.resource_id, rp.action_id
        FROM pmsn.user_role ur
        JOIN pmsn.role r ON ur.role_id = r.id
        JOIN pmsn.role_permission rp ON r.id = rp.role_id
        WHERE ur.user_id = $1 AND (r.tenant_id = $2 OR r.tenant_id IS NULL)

        UNION

        SELECT gp.resource_id, gp.action_id
        FROM pmsn.user_group ug
        JOIN pmsn."group" g ON ug.group_id = g.id
        JOIN pmsn.group_permission gp ON g.id = gp.group_id
        WHERE ug.user_id = $1 AND (g.tenant_id = $2 OR g.tenant_id IS NULL)
    ) p
    JOIN pmsn.resource_action_tenant rat
      ON p.resource_id = rat.resource_id AND p.action_id = rat.action_id
    WHERE rat.tenant_id = $2
"#;

/// The management-gate decision: true if any of three conditions holds.
///
/// 1. the primary permission via a global subject;
/// 2. the primary permission via a tenant-matching subject, with the pair
///    enabled for the tenant;
/// 3. any subject associating the user with the tenant, plus the
///    associated permission (tenant-filtered).
///
/// Global subjects always count toward the user's grants; the enablement
/// table only ever matches on the concrete tenant.
const CHECK_GATE_SQL: &str = r#"
    WITH
        target_perm AS (
            SELECT r.id AS res_id, a.id AS act_id
            FROM pmsn.resource r JOIN pmsn.action a ON r.id = a.resource_id
            WHERE r.code = $3 AND a.code = $4
        ),
        assoc_perm AS (
            SELECT r.id AS res_id, a.id AS act_id
            FROM pmsn.resource r JOIN pmsn.action a ON r.id = a.resource_id
            WHERE r.code = $5 AND a.code = $6
        ),
        user_roles AS (
            SELECT r.id, r.tenant_id
            FROM pmsn.user_role ur JOIN pmsn.role r ON ur.role_id = r.id
            WHERE ur.user_id = $1
        ),
        user_groups AS (
            SELECT g.id, g.tenant_id
            FROM pmsn.user_group ug JOIN pmsn."group" g ON ug.group_id = g.id
            WHERE ug.user_id = $1
        ),
        raw_perms AS (
            SELECT rp.resource_id, rp.action_id, ur.tenant_id
            FROM user_roles ur JOIN pmsn.role_permission rp ON ur.id = rp.role_id
            UNION
            SELECT gp.resource_id, gp.action_id, ug.tenant_id
            FROM user_groups ug JOIN pmsn.group_permission gp ON ug.id = gp.group_id
        )
    SELECT EXISTS (
        SELECT 1 FROM raw_perms p, target_perm tp
        WHERE p.resource_id = tp.res_id AND p.action_id = tp.act_id
          AND p.tenant_id IS NULL

        UNION

        SELECT 1 FROM raw_perms p, target_perm tp, pmsn.resource_action_tenant rat
        WHERE $2::text IS NOT NULL
          AND p.resource_id = tp.res_id AND p.action_id = tp.act_id
          AND (p.tenant_id = $2 OR p.tenant_id IS NULL)
          AND rat.resource_id = tp.res_id AND rat.action_id = tp.act_id
          AND rat.tenant_id = $2

        UNION

        SELECT 1
        WHERE $2::text IS NOT NULL
          AND EXISTS (
              SELECT 1 FROM user_roles WHERE tenant_id = $2
              UNION
              SELECT 1 FROM user_groups WHERE tenant_id = $2
          )
          AND EXISTS (
              SELECT 1 FROM raw_perms p, assoc_perm ap, pmsn.resource_action_tenant rat
              WHERE p.resource_id = ap.res_id AND p.action_id = ap.act_id
                AND (p.tenant_id = $2 OR p.tenant_id IS NULL)
                AND rat.resource_id = ap.res_id AND rat.action_id = ap.act_id
                AND rat.tenant_id = $2
          )
    )
"#;

#[derive(Debug, Clone)]
pub struct PermissionRepository {
    pool: PgPool,
}

impl PermissionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// The user's effective permission id-set, in one statement.
    pub async fn user_permissions(
        &self,
        user_id: &str,
        tenant_id: Option<&str>,
    ) -> Result<Vec<Permission>, StorageError> {
        let rows: Vec<(String, String)> = match tenant_id {
            None => {
                sqlx::query_as(GLOBAL_PERMISSIONS_SQL)
                    .bind(user_id)
                    .fetch_all(&self.pool)
                    .await?
            }
            Some(tenant_id) => {
                sqlx::query_as(TENANT_PERMISSIONS_SQL)
                    .bind(user_id)
                    .bind(tenant_id)
                    .fetch_all(&self.pool)
                    .await?
            }
        };

        Ok(rows
            .into_iter()
            .map(|(resource_id, action_id)| Permission {
                resource_id,
                action_id,
            })
            .collect())
    }

    /// Whether the user holds any role or group scoped to the tenant.
    pub async fn is_user_associated_with_tenant(
        &self,
        user_id: &str,
        tenant_id: &str,
    ) -> Result<bool, StorageError> {
        let row: Option<(i32,)> = sqlx::query_as(
            r#"
            SELECT 1 FROM (
                SELECT r.tenant_id
                FROM pmsn.user_role ur JOIN pmsn.role r ON ur.role_id = r.id
                WHERE ur.user_id = $1
                UNION
                SELECT g.tenant_id
                FROM pmsn.user_group ug JOIN pmsn."group" g ON ug.group_id = g.id
                WHERE ug.user_id = $1
            ) t
            WHERE t.tenant_id = $2
            LIMIT 1
            "#,
        )
        .bind(user_id)
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.is_some())
    }

    /// The three-way management-gate check, in one query.
    pub async fn check_gate(
        &self,
        user_id: &str,
        tenant_id: Option<&str>,
        primary: &PermissionCode,
        associated: &PermissionCode,
    ) -> Result<bool, StorageError> {
        let (allowed,): (bool,) = sqlx::query_as(CHECK_GATE_SQL)
            .bind(user_id)
            .bind(tenant_id)
            .bind(&primary.resource_code)
            .bind(&primary.action_code)
            .bind(&associated.resource_code)
            .bind(&associated.action_code)
            .fetch_one(&self.pool)
            .await?;
        Ok(allowed)
    }
}
