//! Event-system lifecycle: topology declaration, consumer startup, and
//! the health-check loop.

use std::sync::Arc;

use tracing::info;
use warden_storage::audit::AuditStore;

use crate::consumer::EventConsumer;
use crate::error::EventError;
use crate::health::HealthChecker;
use crate::provider::QueueProvider;
use crate::publisher::EventPublisher;
use crate::router::EventRouter;

pub const EXCHANGE_NAME: &str = "rbac_permissions";
pub const QUEUE_NAME: &str = "permissions";
/// Only request events are consumed; terminal events flow to external
/// subscribers.
pub const REQUEST_BINDING: &str = "rbac.*.*.request";

pub const CONSUMER_MAX_RETRIES: u32 = 3;

pub struct EventManager<P, A> {
    provider: Arc<P>,
    consumer: EventConsumer<P, A>,
    health_checker: Arc<HealthChecker<P>>,
    /// Skip exchange/queue/binding declarations when the broker topology
    /// is owned externally. Publish and consume still use the same names.
    skip_declarations: bool,
}

impl<P, A> EventManager<P, A>
where
    P: QueueProvider + 'static,
    A: AuditStore + 'static,
{
    /// Assemble the manager from parts built during bootstrap: the
    /// publisher exists before the application services (which borrow its
    /// narrow sink), and the router is fully registered before any
    /// consumer starts.
    pub fn new(
        provider: Arc<P>,
        audit: Arc<A>,
        router: Arc<EventRouter>,
        skip_declarations: bool,
    ) -> Self {
        let consumer = EventConsumer::new(
            Arc::clone(&provider),
            audit,
            router,
            QUEUE_NAME,
            CONSUMER_MAX_RETRIES,
        );
        let health_checker = Arc::new(HealthChecker::new(Arc::clone(&provider), None));

        Self {
            provider,
            consumer,
            health_checker,
            skip_declarations,
        }
    }

    /// Build the publisher for a provider/ledger pair. Called before
    /// `new` so application services and handlers can hold it.
    pub fn build_publisher(provider: Arc<P>, audit: Arc<A>) -> EventPublisher<P, A> {
        EventPublisher::new(provider, audit, EXCHANGE_NAME)
    }

    pub async fn start(&self) -> Result<(), EventError> {
        info!("starting event system");

        self.provider.connect().await?;

        if self.skip_declarations {
            info!("external queue manager enabled, skipping topology declarations");
        } else {
            self.provider.declare_exchange(EXCHANGE_NAME, "topic").await?;
            self.provider.declare_queue(QUEUE_NAME).await?;
            self.provider
                .bind_queue(QUEUE_NAME, EXCHANGE_NAME, REQUEST_BINDING)
                .await?;
        }

        self.consumer.start().await?;

        let health_checker = Arc::clone(&self.health_checker);
        tokio::spawn(async move { health_checker.run().await });

        info!("event system started");
        Ok(())
    }

    pub async fn stop(&self) -> Result<(), EventError> {
        info!("stopping event system");

        self.health_checker.stop();
        self.provider.close().await?;

        info!("event system stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use warden_core::event::{Event, USER_ROLE_ASSIGN_REQUEST, USER_ROLE_ASSIGN_SUCCESS};
    use warden_storage::audit::InMemoryAuditStore;

    use super::*;
    use crate::memory::InMemoryProvider;
    use crate::publisher::EventSink;

    #[tokio::test]
    async fn start_declares_topology_and_wires_the_consumer() {
        let provider = Arc::new(InMemoryProvider::new());
        let audit = Arc::new(InMemoryAuditStore::new());

        let mut router = EventRouter::new();
        router.register(USER_ROLE_ASSIGN_REQUEST, |_event: Event| async { Ok(()) });

        let manager = EventManager::new(
            Arc::clone(&provider),
            Arc::clone(&audit),
            Arc::new(router),
            false,
        );
        manager.start().await.unwrap();

        assert_eq!(
            provider.exchanges(),
            vec![(EXCHANGE_NAME.to_string(), "topic".to_string())]
        );

        let event = Event::with_id("e1", USER_ROLE_ASSIGN_REQUEST, serde_json::Value::Null);
        provider
            .publish(
                EXCHANGE_NAME,
                USER_ROLE_ASSIGN_REQUEST,
                &serde_json::to_vec(&event).unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(audit.consumed().len(), 1);
        manager.stop().await.unwrap();
    }

    #[tokio::test]
    async fn external_manager_skips_declarations_so_consume_has_no_queue() {
        let provider = Arc::new(InMemoryProvider::new());
        let audit = Arc::new(InMemoryAuditStore::new());
        let manager = EventManager::new(
            Arc::clone(&provider),
            Arc::clone(&audit),
            Arc::new(EventRouter::new()),
            true,
        );

        // with nothing declared, the in-memory broker rejects the
        // subscription, proving no declaration happened
        assert!(manager.start().await.is_err());
    }

    #[tokio::test]
    async fn publisher_and_consumer_share_one_ledger_round_trip() {
        let provider = Arc::new(InMemoryProvider::new());
        let audit = Arc::new(InMemoryAuditStore::new());

        let publisher = Arc::new(EventManager::build_publisher(
            Arc::clone(&provider),
            Arc::clone(&audit),
        ));

        let mut router = EventRouter::new();
        router.register(USER_ROLE_ASSIGN_REQUEST, |_event: Event| async { Ok(()) });

        let manager = EventManager::new(
            Arc::clone(&provider),
            Arc::clone(&audit),
            Arc::new(router),
            false,
        );
        manager.start().await.unwrap();

        let sink: &dyn EventSink = publisher.as_ref();
        sink.publish(USER_ROLE_ASSIGN_REQUEST, serde_json::json!({"role_id": "r1"}))
            .await
            .unwrap();
        sink.publish(USER_ROLE_ASSIGN_SUCCESS, serde_json::json!({"role_id": "r1"}))
            .await
            .unwrap();

        // both were recorded as published; only the request was consumed
        assert_eq!(audit.published().len(), 2);
        assert_eq!(audit.consumed().len(), 1);
        assert_eq!(
            audit.consumed()[0].event_type,
            USER_ROLE_ASSIGN_REQUEST
        );
    }
}
