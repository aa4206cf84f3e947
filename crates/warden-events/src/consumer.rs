//! Event consumption with an audit trail.
//!
//! Per message: deserialize (malformed events are acked and dropped, never
//! requeued), record a `processing` row, dispatch through the router with
//! back-off, then settle the row to `completed` or `failed`. A returned
//! error reaches the provider layer, which nacks with requeue.

use std::sync::Arc;

use tracing::{error, info, warn};
use warden_core::event::{ConsumeStatus, ConsumedEvent, Event};
use warden_storage::audit::AuditStore;

use crate::backoff_delay;
use crate::error::EventError;
use crate::provider::{MessageHandler, QueueProvider};
use crate::router::EventRouter;

pub struct EventConsumer<P, A> {
    provider: Arc<P>,
    audit: Arc<A>,
    router: Arc<EventRouter>,
    queue: String,
    max_retries: u32,
}

impl<P, A> EventConsumer<P, A>
where
    P: QueueProvider,
    A: AuditStore + 'static,
{
    pub fn new(
        provider: Arc<P>,
        audit: Arc<A>,
        router: Arc<EventRouter>,
        queue: impl Into<String>,
        max_retries: u32,
    ) -> Self {
        Self {
            provider,
            audit,
            router,
            queue: queue.into(),
            max_retries,
        }
    }

    pub async fn start(&self) -> Result<(), EventError> {
        info!(queue = %self.queue, "starting consumer");

        let audit = Arc::clone(&self.audit);
        let router = Arc::clone(&self.router);
        let max_retries = self.max_retries;

        let handler: MessageHandler = Arc::new(move |body: Vec<u8>| {
            let audit = Arc::clone(&audit);
            let router = Arc::clone(&router);
            Box::pin(handle_message(audit, router, max_retries, body))
        });

        self.provider.consume(&self.queue, handler).await
    }
}

async fn handle_message<A: AuditStore>(
    audit: Arc<A>,
    router: Arc<EventRouter>,
    max_retries: u32,
    body: Vec<u8>,
) -> Result<(), EventError> {
    let event: Event = match serde_json::from_slice(&body) {
        Ok(event) => event,
        Err(e) => {
            // ack and drop: a malformed envelope will never parse better
            // on redelivery
            error!(error = %e, "failed to deserialize event, dropping");
            return Ok(());
        }
    };

    info!(event_id = %event.id, event_type = %event.event_type, "received event");

    let audit_row = ConsumedEvent::processing(&event.id, &event.event_type, body);
    if let Err(e) = audit.create_consumed(&audit_row).await {
        error!(event_id = %event.id, error = %e, "failed to create consumed event audit entry");
        return Err(e.into());
    }

    match dispatch_with_retry(&router, &event, max_retries).await {
        Ok(()) => {
            if let Err(e) = audit
                .update_consumed(&event.id, ConsumeStatus::Completed, None, 0)
                .await
            {
                error!(event_id = %event.id, error = %e, "failed to update consumed event audit entry");
            }
            Ok(())
        }
        Err(e) => {
            if let Err(update_err) = audit
                .update_consumed(
                    &event.id,
                    ConsumeStatus::Failed,
                    Some(&e.to_string()),
                    max_retries as i32,
                )
                .await
            {
                error!(event_id = %event.id, error = %update_err, "failed to update consumed event audit entry");
            }
            Err(e)
        }
    }
}

async fn dispatch_with_retry(
    router: &EventRouter,
    event: &Event,
    max_retries: u32,
) -> Result<(), EventError> {
    let mut last_err = None;

    for attempt in 0..=max_retries {
        match router.dispatch(event.clone()).await {
            Ok(()) => return Ok(()),
            Err(e) => {
                warn!(
                    event_id = %event.id,
                    event_type = %event.event_type,
                    attempt = attempt + 1,
                    max_retries,
                    error = %e,
                    "failed to process event, retrying"
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
        last_err.unwrap_or_else(|| EventError::Handler("no attempt made".to_string())),
    ))
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use warden_core::event::{USER_ROLE_ASSIGN_REQUEST, UserRolePayload};
    use warden_storage::audit::InMemoryAuditStore;

    use super::*;
    use crate::manager::{EXCHANGE_NAME, QUEUE_NAME, REQUEST_BINDING};
    use crate::memory::InMemoryProvider;

    async fn wired_provider(
        router: EventRouter,
        audit: &Arc<InMemoryAuditStore>,
    ) -> Arc<InMemoryProvider> {
        let provider = Arc::new(InMemoryProvider::new());
        provider.connect().await.unwrap();
        provider.declare_exchange(EXCHANGE_NAME, "topic").await.unwrap();
        provider.declare_queue(QUEUE_NAME).await.unwrap();
        provider
            .bind_queue(QUEUE_NAME, EXCHANGE_NAME, REQUEST_BINDING)
            .await
            .unwrap();

        let consumer = EventConsumer::new(
            Arc::clone(&provider),
            Arc::clone(audit),
            Arc::new(router),
            QUEUE_NAME,
            3,
        );
        consumer.start().await.unwrap();
        provider
    }

    fn request_event() -> Vec<u8> {
        let payload = UserRolePayload {
            user_ids: vec!["u1".into(), "u2".into()],
            role_id: "r1".into(),
        };
        let event = Event::with_id(
            "req-1",
            USER_ROLE_ASSIGN_REQUEST,
            serde_json::to_value(&payload).unwrap(),
        );
        serde_json::to_vec(&event).unwrap()
    }

    #[tokio::test]
    async fn happy_path_completes_the_audit_row_and_acks() {
        let handled = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&handled);

        let mut router = EventRouter::new();
        router.register(USER_ROLE_ASSIGN_REQUEST, move |event: Event| {
            let seen = Arc::clone(&seen);
            async move {
                let payload: UserRolePayload = serde_json::from_value(event.payload)?;
                seen.lock().unwrap().push(payload);
                Ok(())
            }
        });

        let audit = Arc::new(InMemoryAuditStore::new());
        let provider = wired_provider(router, &audit).await;

        provider
            .publish(EXCHANGE_NAME, USER_ROLE_ASSIGN_REQUEST, &request_event())
            .await
            .unwrap();

        assert_eq!(handled.lock().unwrap().len(), 1);
        assert_eq!(handled.lock().unwrap()[0].role_id, "r1");

        let rows = audit.consumed();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, "req-1");
        assert_eq!(rows[0].status, ConsumeStatus::Completed);
        assert_eq!(rows[0].retry_count, 0);
        assert_eq!(provider.nacked().len(), 0);
    }

    #[tokio::test]
    async fn malformed_envelope_is_acked_and_leaves_no_ledger_row() {
        let router = EventRouter::new();
        let audit = Arc::new(InMemoryAuditStore::new());
        let provider = wired_provider(router, &audit).await;

        provider
            .publish(EXCHANGE_NAME, USER_ROLE_ASSIGN_REQUEST, b"not json")
            .await
            .unwrap();

        assert!(audit.consumed().is_empty());
        assert_eq!(provider.nacked().len(), 0, "malformed events never requeue");
    }

    #[tokio::test(start_paused = true)]
    async fn handler_failure_exhausts_retries_then_fails_the_row_and_nacks() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&attempts);

        let mut router = EventRouter::new();
        router.register(USER_ROLE_ASSIGN_REQUEST, move |_event: Event| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(EventError::Handler("store unavailable".to_string()))
            }
        });

        let audit = Arc::new(InMemoryAuditStore::new());
        let provider = wired_provider(router, &audit).await;

        provider
            .publish(EXCHANGE_NAME, USER_ROLE_ASSIGN_REQUEST, &request_event())
            .await
            .unwrap();

        // attempts 0..=3
        assert_eq!(attempts.load(Ordering::SeqCst), 4);

        let rows = audit.consumed();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].status, ConsumeStatus::Failed);
        assert_eq!(rows[0].retry_count, 3);
        assert!(rows[0].error_message.as_deref().unwrap().contains("store unavailable"));
        assert_eq!(provider.nacked().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_handler_failure_recovers_within_the_budget() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&attempts);

        let mut router = EventRouter::new();
        router.register(USER_ROLE_ASSIGN_REQUEST, move |_event: Event| {
            let counter = Arc::clone(&counter);
            async move {
                // the store is down for the first two attempts
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(EventError::Handler("store unavailable".to_string()))
                } else {
                    Ok(())
                }
            }
        });

        let audit = Arc::new(InMemoryAuditStore::new());
        let provider = wired_provider(router, &audit).await;

        provider
            .publish(EXCHANGE_NAME, USER_ROLE_ASSIGN_REQUEST, &request_event())
            .await
            .unwrap();

        assert_eq!(attempts.load(Ordering::SeqCst), 3);

        let rows = audit.consumed();
        assert_eq!(rows[0].status, ConsumeStatus::Completed);
        assert_eq!(provider.nacked().len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn unroutable_event_type_fails_the_row() {
        let router = EventRouter::new();
        let audit = Arc::new(InMemoryAuditStore::new());
        let provider = wired_provider(router, &audit).await;

        provider
            .publish(EXCHANGE_NAME, USER_ROLE_ASSIGN_REQUEST, &request_event())
            .await
            .unwrap();

        let rows = audit.consumed();
        assert_eq!(rows[0].status, ConsumeStatus::Failed);
        assert!(rows[0].error_message.as_deref().unwrap().contains("no handler registered"));
    }
}
