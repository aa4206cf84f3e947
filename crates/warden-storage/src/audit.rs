//! The event audit ledger: `published_events` and `consumed_events`.
//!
//! The ledger records attempts, not deliveries. A publisher row is created
//! `pending` before the broker send; a consumer row is created
//! `processing` on receipt. Rows are updated in place to a terminal
//! status and never regress.
//!
//! Published ids are unique: inserting one twice is a programmer bug and
//! surfaces as `DuplicateEvent`. Consumed rows are one per delivery: a
//! broker redelivery of the same event id appends a new row, and updates
//! and lookups address the newest row for the id.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use warden_core::event::{ConsumeStatus, ConsumedEvent, PublishStatus, PublishedEvent};

use crate::error::StorageError;

pub trait AuditStore: Send + Sync {
    fn create_published(
        &self,
        event: &PublishedEvent,
    ) -> impl Future<Output = Result<(), StorageError>> + Send;

    fn update_published(
        &self,
        id: &str,
        status: PublishStatus,
        error: Option<&str>,
    ) -> impl Future<Output = Result<(), StorageError>> + Send;

    fn create_consumed(
        &self,
        event: &ConsumedEvent,
    ) -> impl Future<Output = Result<(), StorageError>> + Send;

    fn update_consumed(
        &self,
        id: &str,
        status: ConsumeStatus,
        error: Option<&str>,
        retry_count: i32,
    ) -> impl Future<Output = Result<(), StorageError>> + Send;

    fn get_consumed(
        &self,
        id: &str,
    ) -> impl Future<Output = Result<Option<ConsumedEvent>, StorageError>> + Send;
}

// ---------------------------------------------------------------------------
// Postgres
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct PostgresAuditStore {
    pool: PgPool,
}

impl PostgresAuditStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl AuditStore for PostgresAuditStore {
    async fn create_published(&self, event: &PublishedEvent) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            INSERT INTO pmsn.published_events
                (id, event_type, payload, status, error_message, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(&event.id)
        .bind(&event.event_type)
        .bind(&event.payload)
        .bind(event.status.as_str())
        .bind(event.error_message.as_deref())
        .bind(event.created_at)
        .bind(event.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.is_unique_violation()
            {
                return StorageError::DuplicateEvent(event.id.clone());
            }
            e.into()
        })?;
        Ok(())
    }

    async fn update_published(
        &self,
        id: &str,
        status: PublishStatus,
        error: Option<&str>,
    ) -> Result<(), StorageError> {
        sqlx::query(
            "UPDATE pmsn.published_events SET status = $1, error_message = $2, updated_at = $3 WHERE id = $4",
        )
        .bind(status.as_str())
        .bind(error)
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn create_consumed(&self, event: &ConsumedEvent) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            INSERT INTO pmsn.consumed_events
                (id, event_type, payload, status, error_message, retry_count, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(&event.id)
        .bind(&event.event_type)
        .bind(&event.payload)
        .bind(event.status.as_str())
        .bind(event.error_message.as_deref())
        .bind(event.retry_count)
        .bind(event.created_at)
        .bind(event.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_consumed(
        &self,
        id: &str,
        status: ConsumeStatus,
        error: Option<&str>,
        retry_count: i32,
    ) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            UPDATE pmsn.consumed_events
            SET status = $1, error_message = $2, retry_count = $3, updated_at = $4
            WHERE seq = (SELECT max(seq) FROM pmsn.consumed_events WHERE id = $5)
            "#,
        )
        .bind(status.as_str())
        .bind(error)
        .bind(retry_count)
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_consumed(&self, id: &str) -> Result<Option<ConsumedEvent>, StorageError> {
        type Row = (
            String,
            String,
            Vec<u8>,
            String,
            Option<String>,
            i32,
            DateTime<Utc>,
            DateTime<Utc>,
        );
        let row: Option<Row> = sqlx::query_as(
            r#"
            SELECT id, event_type, payload, status, error_message, retry_count, created_at, updated_at
            FROM pmsn.consumed_events
            WHERE id = $1
            ORDER BY seq DESC
            LIMIT 1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(
            |(id, event_type, payload, status, error_message, retry_count, created_at, updated_at)| {
                Ok(ConsumedEvent {
                    id,
                    event_type,
                    payload,
                    status: ConsumeStatus::from_str(&status)?,
                    error_message,
                    retry_count,
                    created_at,
                    updated_at,
                })
            },
        )
        .transpose()
    }
}

// ---------------------------------------------------------------------------
// In-memory (tests and local development)
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct InnerLedger {
    published: HashMap<String, PublishedEvent>,
    consumed: Vec<ConsumedEvent>,
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryAuditStore {
    state: Arc<Mutex<InnerLedger>>,
}

impl InMemoryAuditStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn published(&self) -> Vec<PublishedEvent> {
        self.state.lock().unwrap().published.values().cloned().collect()
    }

    pub fn get_published(&self, id: &str) -> Option<PublishedEvent> {
        self.state.lock().unwrap().published.get(id).cloned()
    }

    pub fn consumed(&self) -> Vec<ConsumedEvent> {
        self.state.lock().unwrap().consumed.clone()
    }
}

impl AuditStore for InMemoryAuditStore {
    async fn create_published(&self, event: &PublishedEvent) -> Result<(), StorageError> {
        let mut state = self.state.lock().unwrap();
        if state.published.contains_key(&event.id) {
            return Err(StorageError::DuplicateEvent(event.id.clone()));
        }
        state.published.insert(event.id.clone(), event.clone());
        Ok(())
    }

    async fn update_published(
        &self,
        id: &str,
        status: PublishStatus,
        error: Option<&str>,
    ) -> Result<(), StorageError> {
        let mut state = self.state.lock().unwrap();
        let row = state
            .published
            .get_mut(id)
            .ok_or_else(|| StorageError::EventNotFound(id.to_string()))?;
        row.status = status;
        row.error_message = error.map(str::to_string);
        row.updated_at = Utc::now();
        Ok(())
    }

    async fn create_consumed(&self, event: &ConsumedEvent) -> Result<(), StorageError> {
        self.state.lock().unwrap().consumed.push(event.clone());
        Ok(())
    }

    async fn update_consumed(
        &self,
        id: &str,
        status: ConsumeStatus,
        error: Option<&str>,
        retry_count: i32,
    ) -> Result<(), StorageError> {
        let mut state = self.state.lock().unwrap();
        let row = state
            .consumed
            .iter_mut()
            .rev()
            .find(|e| e.id == id)
            .ok_or_else(|| StorageError::EventNotFound(id.to_string()))?;
        row.status = status;
        row.error_message = error.map(str::to_string);
        row.retry_count = retry_count;
        row.updated_at = Utc::now();
        Ok(())
    }

    async fn get_consumed(&self, id: &str) -> Result<Option<ConsumedEvent>, StorageError> {
        let state = self.state.lock().unwrap();
        Ok(state.consumed.iter().rev().find(|e| e.id == id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn duplicate_published_id_is_a_hard_error() {
        let store = InMemoryAuditStore::new();
        let row = PublishedEvent::pending("e1", "rbac.user_role.assign.request", vec![]);

        store.create_published(&row).await.unwrap();
        let err = store.create_published(&row).await.unwrap_err();

        assert_eq!(err, StorageError::DuplicateEvent("e1".to_string()));
    }

    #[tokio::test]
    async fn published_row_reaches_terminal_status() {
        let store = InMemoryAuditStore::new();
        let row = PublishedEvent::pending("e1", "rbac.user_role.assign.request", vec![1]);
        store.create_published(&row).await.unwrap();

        store
            .update_published("e1", PublishStatus::Published, None)
            .await
            .unwrap();

        let row = store.get_published("e1").unwrap();
        assert_eq!(row.status, PublishStatus::Published);
        assert_eq!(row.error_message, None);
    }

    #[tokio::test]
    async fn redelivery_appends_a_second_consumed_row() {
        let store = InMemoryAuditStore::new();
        let row = ConsumedEvent::processing("e1", "rbac.user_role.assign.request", vec![]);

        store.create_consumed(&row).await.unwrap();
        store.create_consumed(&row).await.unwrap();

        assert_eq!(store.consumed().len(), 2);
    }

    #[tokio::test]
    async fn consumed_update_targets_the_newest_row_for_an_id() {
        let store = InMemoryAuditStore::new();
        let row = ConsumedEvent::processing("e1", "rbac.user_role.assign.request", vec![]);
        store.create_consumed(&row).await.unwrap();
        store
            .update_consumed("e1", ConsumeStatus::Failed, Some("boom"), 3)
            .await
            .unwrap();

        // redelivery
        store.create_consumed(&row).await.unwrap();
        store
            .update_consumed("e1", ConsumeStatus::Completed, None, 0)
            .await
            .unwrap();

        let rows = store.consumed();
        assert_eq!(rows[0].status, ConsumeStatus::Failed);
        assert_eq!(rows[0].retry_count, 3);
        assert_eq!(rows[1].status, ConsumeStatus::Completed);

        let latest = store.get_consumed("e1").await.unwrap().unwrap();
        assert_eq!(latest.status, ConsumeStatus::Completed);
    }

    #[tokio::test]
    async fn updating_an_unknown_id_errors() {
        let store = InMemoryAuditStore::new();
        let err = store
            .update_consumed("missing", ConsumeStatus::Completed, None, 0)
            .await
            .unwrap_err();
        assert_eq!(err, StorageError::EventNotFound("missing".to_string()));
    }
}
