//! Embedded schema migrations for the `pmsn` schema.
//!
//! Statements are idempotent and executed one at a time, so a partially
//! applied run can simply be re-run.

use sqlx::PgPool;
use tracing::info;

use crate::error::StorageError;

const STATEMENTS: &[&str] = &[
    "CREATE SCHEMA IF NOT EXISTS pmsn",
    r#"
    CREATE TABLE IF NOT EXISTS pmsn.resource (
        id          TEXT PRIMARY KEY,
        code        TEXT NOT NULL UNIQUE,
        name        TEXT NOT NULL,
        description TEXT NOT NULL DEFAULT ''
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS pmsn.action (
        id          TEXT PRIMARY KEY,
        resource_id TEXT NOT NULL REFERENCES pmsn.resource(id),
        code        TEXT NOT NULL,
        name        TEXT NOT NULL,
        description TEXT NOT NULL DEFAULT '',
        UNIQUE (resource_id, code)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS pmsn.role (
        id        TEXT PRIMARY KEY,
        name      TEXT NOT NULL,
        tenant_id TEXT
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS pmsn."group" (
        id        TEXT PRIMARY KEY,
        name      TEXT NOT NULL,
        tenant_id TEXT
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS pmsn.role_permission (
        role_id     TEXT NOT NULL REFERENCES pmsn.role(id),
        resource_id TEXT NOT NULL REFERENCES pmsn.resource(id),
        action_id   TEXT NOT NULL REFERENCES pmsn.action(id),
        PRIMARY KEY (role_id, resource_id, action_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS pmsn.group_permission (
        group_id    TEXT NOT NULL REFERENCES pmsn."group"(id),
        resource_id TEXT NOT NULL REFERENCES pmsn.resource(id),
        action_id   TEXT NOT NULL REFERENCES pmsn.action(id),
        PRIMARY KEY (group_id, resource_id, action_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS pmsn.user_role (
        user_id TEXT NOT NULL,
        role_id TEXT NOT NULL REFERENCES pmsn.role(id),
        PRIMARY KEY (user_id, role_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS pmsn.user_group (
        user_id  TEXT NOT NULL,
        group_id TEXT NOT NULL REFERENCES pmsn."group"(id),
        PRIMARY KEY (user_id, group_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS pmsn.resource_action_tenant (
        resource_id TEXT NOT NULL REFERENCES pmsn.resource(id),
        action_id   TEXT NOT NULL REFERENCES pmsn.action(id),
        tenant_id   TEXT NOT NULL,
        PRIMARY KEY (resource_id, action_id, tenant_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS pmsn.published_events (
        id            TEXT PRIMARY KEY,
        event_type    TEXT NOT NULL,
        payload       BYTEA NOT NULL,
        status        TEXT NOT NULL,
        error_message TEXT,
        created_at    TIMESTAMPTZ NOT NULL DEFAULT now(),
        updated_at    TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
    // One row per delivery: a broker redelivery of the same event id
    // appends a new row, so `id` is indexed but not unique.
    r#"
    CREATE TABLE IF NOT EXISTS pmsn.consumed_events (
        seq           BIGSERIAL PRIMARY KEY,
        id            TEXT NOT NULL,
        event_type    TEXT NOT NULL,
        payload       BYTEA NOT NULL,
        status        TEXT NOT NULL,
        error_message TEXT,
        retry_count   INTEGER NOT NULL DEFAULT 0,
        created_at    TIMESTAMPTZ NOT NULL DEFAULT now(),
        updated_at    TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_user_role_user ON pmsn.user_role (user_id)",
    "CREATE INDEX IF NOT EXISTS idx_user_group_user ON pmsn.user_group (user_id)",
    "CREATE INDEX IF NOT EXISTS idx_rat_tenant ON pmsn.resource_action_tenant (tenant_id)",
    "CREATE INDEX IF NOT EXISTS idx_consumed_events_id ON pmsn.consumed_events (id)",
];

pub async fn run(pool: &PgPool) -> Result<(), StorageError> {
    for statement in STATEMENTS {
        sqlx::query(statement).execute(pool).await?;
    }
    info!(statements = STATEMENTS.len(), "migrations applied");
    Ok(())
}
