//! Event publishing with an audit trail.
//!
//! Every publish attempt is recorded: a `pending` row before the broker
//! send, transitioned to `published` or `failed` afterwards. Failure to
//! create the row is fatal for the attempt; failure to update it after a
//! successful send is logged and swallowed, since the event is already
//! on the broker.

use std::sync::Arc;

use futures::future::BoxFuture;
use tracing::{error, info, warn};
use warden_core::event::{Event, PublishStatus, PublishedEvent};
use warden_storage::audit::AuditStore;

use crate::backoff_delay;
use crate::error::EventError;
use crate::provider::QueueProvider;

/// The retry budget of the `publish` facade.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// The narrow capability handed to application code. The publisher's
/// richer surface (`publish_with_retry`) stays with the event handlers.
pub trait EventSink: Send + Sync {
    fn publish(
        &self,
        event_type: &str,
        payload: serde_json::Value,
    ) -> BoxFuture<'_, Result<(), EventError>>;
}

pub struct EventPublisher<P, A> {
    provider: Arc<P>,
    audit: Arc<A>,
    exchange: String,
}

impl<P: QueueProvider, A: AuditStore> EventPublisher<P, A> {
    pub fn new(provider: Arc<P>, audit: Arc<A>, exchange: impl Into<String>) -> Self {
        Self {
            provider,
            audit,
            exchange: exchange.into(),
        }
    }

    /// One publish attempt. The caller's event is not mutated: a copy is
    /// taken and given a fresh id if the caller left it blank, so a retry
    /// of a blank-id event never collides in the ledger. Returns the id
    /// the event was published (and recorded) under.
    pub async fn publish_raw(&self, event: &Event) -> Result<String, EventError> {
        let mut event = event.clone();
        event.ensure_id();

        let payload_bytes = serde_json::to_vec(&event.payload)?;
        let audit_row = PublishedEvent::pending(&event.id, &event.event_type, payload_bytes);
        self.audit.create_published(&audit_row).await.map_err(|e| {
            error!(
                event_id = %event.id,
                event_type = %event.event_type,
                error = %e,
                "failed to create published event audit entry"
            );
            e
        })?;

        let body = match serde_json::to_vec(&event) {
            Ok(body) => body,
            Err(e) => {
                self.mark_failed(&event.id, &e.to_string()).await;
                return Err(e.into());
            }
        };

        if let Err(e) = self
            .provider
            .publish(&self.exchange, &event.event_type, &body)
            .await
        {
            self.mark_failed(&event.id, &e.to_string()).await;
            error!(
                event_id = %event.id,
                event_type = %event.event_type,
                error = %e,
                "failed to publish event"
            );
            return Err(e);
        }

        if let Err(e) = self
            .audit
            .update_published(&event.id, PublishStatus::Published, None)
            .await
        {
            // the event is on the broker; the stale row is recoverable
            error!(event_id = %event.id, error = %e, "failed to update published event audit entry");
        }

        info!(event_id = %event.id, event_type = %event.event_type, "event published");
        Ok(event.id)
    }

    /// Publish with exponential back-off: attempts `0..=max_retries`,
    /// sleeping 2^attempt seconds between them.
    pub async fn publish_with_retry(
        &self,
        event: &Event,
        max_retries: u32,
    ) -> Result<String, EventError> {
        let mut last_err = None;

        for attempt in 0..=max_retries {
            match self.publish_raw(event).await {
                Ok(id) => return Ok(id),
                Err(e) => {
                    warn!(
                        event_type = %event.event_type,
                        attempt = attempt + 1,
                        max_retries,
                        error = %e,
                        "failed to publish event, retrying"
                    );
                    last_err = Some(e);
                    if attempt < max_retries {
                        tokio::time::sleep(backoff_delay(attempt)).await;
                    }
                }
            }
        }

        Err(EventError::exhausted(
            max_retries,
            last_err.unwrap_or_else(|| EventError::Transport("no attempt made".to_string())),
        ))
    }

    async fn mark_failed(&self, id: &str, message: &str) {
        if let Err(e) = self
            .audit
            .update_published(id, PublishStatus::Failed, Some(message))
            .await
        {
            error!(event_id = %id, error = %e, "failed to update published event audit entry");
        }
    }
}

impl<P: QueueProvider, A: AuditStore> EventSink for EventPublisher<P, A> {
    /// The facade: a fresh event (blank id, assigned per attempt) with
    /// the default retry budget.
    fn publish(
        &self,
        event_type: &str,
        payload: serde_json::Value,
    ) -> BoxFuture<'_, Result<(), EventError>> {
        let event = Event::new(event_type, payload);
        Box::pin(async move {
            self.publish_with_retry(&event, DEFAULT_MAX_RETRIES)
                .await
                .map(|_| ())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_core::event::USER_ROLE_ASSIGN_SUCCESS;
    use warden_storage::audit::InMemoryAuditStore;

    use crate::manager::EXCHANGE_NAME;
    use crate::memory::InMemoryProvider;

    fn publisher(
        provider: &Arc<InMemoryProvider>,
        audit: &Arc<InMemoryAuditStore>,
    ) -> EventPublisher<InMemoryProvider, InMemoryAuditStore> {
        EventPublisher::new(Arc::clone(provider), Arc::clone(audit), EXCHANGE_NAME)
    }

    #[tokio::test]
    async fn successful_publish_leaves_one_published_row_under_the_returned_id() {
        let provider = Arc::new(InMemoryProvider::new());
        let audit = Arc::new(InMemoryAuditStore::new());
        provider.connect().await.unwrap();

        let publisher = publisher(&provider, &audit);
        let event = Event::new(USER_ROLE_ASSIGN_SUCCESS, serde_json::json!({"role_id": "r1"}));
        let id = publisher.publish_raw(&event).await.unwrap();

        let rows = audit.published();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, id);
        assert_eq!(rows[0].status, PublishStatus::Published);

        let messages = provider.messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].routing_key, USER_ROLE_ASSIGN_SUCCESS);
        let sent: Event = serde_json::from_slice(&messages[0].body).unwrap();
        assert_eq!(sent.id, id);
    }

    #[tokio::test]
    async fn transport_failure_marks_the_row_failed() {
        let provider = Arc::new(InMemoryProvider::new());
        let audit = Arc::new(InMemoryAuditStore::new());
        provider.connect().await.unwrap();
        provider.fail_publishes(usize::MAX);

        let publisher = publisher(&provider, &audit);
        let event = Event::new(USER_ROLE_ASSIGN_SUCCESS, serde_json::Value::Null);
        let err = publisher.publish_raw(&event).await.unwrap_err();
        assert!(matches!(err, EventError::Transport(_)));

        let rows = audit.published();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].status, PublishStatus::Failed);
        assert!(rows[0].error_message.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn retry_recovers_after_transient_transport_failures() {
        let provider = Arc::new(InMemoryProvider::new());
        let audit = Arc::new(InMemoryAuditStore::new());
        provider.connect().await.unwrap();
        provider.fail_publishes(2);

        let publisher = publisher(&provider, &audit);
        let event = Event::new(USER_ROLE_ASSIGN_SUCCESS, serde_json::Value::Null);
        let id = publisher.publish_with_retry(&event, 3).await.unwrap();

        // two failed attempts under their own ids, then the success
        let rows = audit.published();
        assert_eq!(rows.len(), 3);
        let failed = rows
            .iter()
            .filter(|r| r.status == PublishStatus::Failed)
            .count();
        assert_eq!(failed, 2);
        let published: Vec<_> = rows
            .iter()
            .filter(|r| r.status == PublishStatus::Published)
            .collect();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].id, id);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_exhaustion_reports_the_budget_and_last_error() {
        let provider = Arc::new(InMemoryProvider::new());
        let audit = Arc::new(InMemoryAuditStore::new());
        provider.connect().await.unwrap();
        provider.fail_publishes(usize::MAX);

        let publisher = publisher(&provider, &audit);
        let event = Event::new(USER_ROLE_ASSIGN_SUCCESS, serde_json::Value::Null);
        let err = publisher.publish_with_retry(&event, 3).await.unwrap_err();

        assert!(matches!(err, EventError::RetriesExhausted { retries: 3, .. }));
        assert_eq!(audit.published().len(), 4, "one row per attempt");
    }

    #[tokio::test]
    async fn sink_facade_publishes_with_a_fresh_id() {
        let provider = Arc::new(InMemoryProvider::new());
        let audit = Arc::new(InMemoryAuditStore::new());
        provider.connect().await.unwrap();

        let publisher = publisher(&provider, &audit);
        let sink: &dyn EventSink = &publisher;
        sink.publish(USER_ROLE_ASSIGN_SUCCESS, serde_json::json!({"role_id": "r1"}))
            .await
            .unwrap();

        let rows = audit.published();
        assert_eq!(rows.len(), 1);
        assert!(!rows[0].id.is_empty());
    }
}
