//! End-to-end flow over the in-memory broker: a request event travels
//! through the consumer and router into the registered handlers, and the
//! handler's terminal event lands back on the broker.
//!
//! The identity store is a pool that cannot connect, so the membership
//! mutation fails: the handler must exhaust its retries, record the
//! failure in the ledger, and still publish a `…failed` terminal event.

use std::sync::Arc;

use sqlx::PgPool;
use warden_core::event::{
    ConsumeStatus, ErrorPayload, Event, PublishStatus, USER_ROLE_ASSIGN_FAILED,
    USER_ROLE_ASSIGN_REQUEST, UserRolePayload,
};
use warden_events::{
    EXCHANGE_NAME, EventManager, EventRouter, InMemoryProvider, QueueProvider,
};
use warden_server::events::register_handlers;
use warden_server::service::{GroupService, RoleService};
use warden_storage::audit::InMemoryAuditStore;
use warden_storage::{GroupRepository, RoleRepository};

#[tokio::test(start_paused = true)]
async fn failed_mutation_fails_the_ledger_row_and_publishes_a_failed_terminal_event() {
    let provider = Arc::new(InMemoryProvider::new());
    let audit = Arc::new(InMemoryAuditStore::new());

    // unreachable store: every mutation attempt errors
    let pool = PgPool::connect_lazy("postgres://warden@127.0.0.1:1/warden").unwrap();
    let roles = Arc::new(RoleService::new(RoleRepository::new(pool.clone()), None));
    let groups = Arc::new(GroupService::new(GroupRepository::new(pool), None));

    let publisher = Arc::new(EventManager::build_publisher(
        Arc::clone(&provider),
        Arc::clone(&audit),
    ));

    let mut router = EventRouter::new();
    register_handlers(&mut router, roles, groups, publisher);

    let manager = EventManager::new(
        Arc::clone(&provider),
        Arc::clone(&audit),
        Arc::new(router),
        false,
    );
    manager.start().await.unwrap();

    let payload = UserRolePayload {
        user_ids: vec!["u1".into(), "u2".into()],
        role_id: "r1".into(),
    };
    let request = Event::with_id(
        "req-1",
        USER_ROLE_ASSIGN_REQUEST,
        serde_json::to_value(&payload).unwrap(),
    );
    provider
        .publish(
            EXCHANGE_NAME,
            USER_ROLE_ASSIGN_REQUEST,
            &serde_json::to_vec(&request).unwrap(),
        )
        .await
        .unwrap();

    // the request's ledger row ends failed with the full retry budget
    let consumed = audit.consumed();
    assert_eq!(consumed.len(), 1);
    assert_eq!(consumed[0].id, "req-1");
    assert_eq!(consumed[0].status, ConsumeStatus::Failed);
    assert_eq!(consumed[0].retry_count, 3);

    // the handler published a failed terminal event per mutation attempt,
    // each carrying the original subjects and the error
    let terminal = provider.messages_for(USER_ROLE_ASSIGN_FAILED);
    assert!(!terminal.is_empty());
    let event: Event = serde_json::from_slice(&terminal[0].body).unwrap();
    let error_payload: ErrorPayload = serde_json::from_value(event.payload).unwrap();
    assert_eq!(error_payload.role_id.as_deref(), Some("r1"));
    assert_eq!(error_payload.user_ids, vec!["u1".to_string(), "u2".to_string()]);
    assert!(!error_payload.error.is_empty());

    // every terminal publish is recorded as published in the ledger
    for message in &terminal {
        let event: Event = serde_json::from_slice(&message.body).unwrap();
        let row = audit.get_published(&event.id).unwrap();
        assert_eq!(row.status, PublishStatus::Published);
    }

    // the delivery was nacked back to the broker for redelivery
    assert_eq!(provider.nacked().len(), 1);

    manager.stop().await.unwrap();
}
