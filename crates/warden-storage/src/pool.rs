//! Postgres connection pool setup.

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tracing::info;

use crate::error::StorageError;

/// Connection settings for the identity store.
#[derive(Clone)]
pub struct DbConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub name: String,
    pub max_connections: u32,
}

impl DbConfig {
    pub fn url(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.user, self.password, self.host, self.port, self.name
        )
    }
}

impl std::fmt::Debug for DbConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("name", &self.name)
            .field("max_connections", &self.max_connections)
            .finish()
    }
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            user: "postgres".to_string(),
            password: String::new(),
            name: "postgres".to_string(),
            max_connections: 10,
        }
    }
}

/// Build the pool and verify the database is reachable.
pub async fn connect(config: &DbConfig) -> Result<PgPool, StorageError> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.url())
        .await?;

    sqlx::query("SELECT 1").execute(&pool).await?;

    info!(
        host = %config.host,
        port = config.port,
        database = %config.name,
        "database connection established"
    );

    Ok(pool)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_assembles_dsn_from_fields() {
        let config = DbConfig {
            host: "db".into(),
            port: 5433,
            user: "warden".into(),
            password: "hunter2".into(),
            name: "pmsn".into(),
            max_connections: 5,
        };
        assert_eq!(config.url(), "postgres://warden:hunter2@db:5433/pmsn");
    }

    #[test]
    fn debug_redacts_password() {
        let config = DbConfig {
            password: "super_secret".into(),
            ..DbConfig::default()
        };
        let debug = format!("{config:?}");
        assert!(!debug.contains("super_secret"), "{debug}");
        assert!(debug.contains("[REDACTED]"), "{debug}");
    }
}
