//! Event handler fan-out for the four membership request types.
//!
//! Each handler parses the typed payload, performs the membership
//! mutation through the application service, and publishes a terminal
//! success or failure event with its own retry budget. A failed terminal
//! publish is logged but never fails the handler: the mutation is
//! already done and recorded.

use std::sync::Arc;

use tracing::{error, info};
use warden_core::event::{
    ErrorPayload, Event, USER_GROUP_ASSIGN_FAILED, USER_GROUP_ASSIGN_REQUEST,
    USER_GROUP_ASSIGN_SUCCESS, USER_GROUP_REMOVE_FAILED, USER_GROUP_REMOVE_REQUEST,
    USER_GROUP_REMOVE_SUCCESS, USER_ROLE_ASSIGN_FAILED, USER_ROLE_ASSIGN_REQUEST,
    USER_ROLE_ASSIGN_SUCCESS, USER_ROLE_REMOVE_FAILED, USER_ROLE_REMOVE_REQUEST,
    USER_ROLE_REMOVE_SUCCESS, UserGroupPayload, UserRolePayload,
};
use warden_events::publisher::DEFAULT_MAX_RETRIES;
use warden_events::{EventError, EventPublisher, EventRouter, QueueProvider};
use warden_storage::audit::AuditStore;

use crate::service::{GroupService, RoleService};

pub struct UserRoleHandlers<P, A> {
    roles: Arc<RoleService>,
    publisher: Arc<EventPublisher<P, A>>,
}

impl<P, A> UserRoleHandlers<P, A>
where
    P: QueueProvider,
    A: AuditStore,
{
    pub fn new(roles: Arc<RoleService>, publisher: Arc<EventPublisher<P, A>>) -> Self {
        Self { roles, publisher }
    }

    pub async fn handle_assign(&self, event: Event) -> Result<(), EventError> {
        let payload: UserRolePayload = serde_json::from_value(event.payload)?;
        info!(
            role_id = %payload.role_id,
            user_count = payload.user_ids.len(),
            "processing user-role assign request"
        );

        let result = self
            .roles
            .assign_users(&payload.role_id, &payload.user_ids)
            .await;

        let terminal = match &result {
            Ok(()) => Event::new(
                USER_ROLE_ASSIGN_SUCCESS,
                serde_json::to_value(&payload)?,
            ),
            Err(e) => {
                error!(role_id = %payload.role_id, error = %e, "failed to assign users to role");
                Event::new(
                    USER_ROLE_ASSIGN_FAILED,
                    serde_json::to_value(ErrorPayload {
                        user_ids: payload.user_ids.clone(),
                        role_id: Some(payload.role_id.clone()),
                        group_id: None,
                        error: e.to_string(),
                    })?,
                )
            }
        };
        publish_terminal(&self.publisher, terminal).await;

        result.map_err(|e| EventError::Handler(e.to_string()))
    }

    pub async fn handle_remove(&self, event: Event) -> Result<(), EventError> {
        let payload: UserRolePayload = serde_json::from_value(event.payload)?;
        info!(
            role_id = %payload.role_id,
            user_count = payload.user_ids.len(),
            "processing user-role remove request"
        );

        let result = self
            .roles
            .remove_users(&payload.role_id, &payload.user_ids)
            .await;

        let terminal = match &result {
            Ok(()) => Event::new(
                USER_ROLE_REMOVE_SUCCESS,
                serde_json::to_value(&payload)?,
            ),
            Err(e) => {
                error!(role_id = %payload.role_id, error = %e, "failed to remove users from role");
                Event::new(
                    USER_ROLE_REMOVE_FAILED,
                    serde_json::to_value(ErrorPayload {
                        user_ids: payload.user_ids.clone(),
                        role_id: Some(payload.role_id.clone()),
                        group_id: None,
                        error: e.to_string(),
                    })?,
                )
            }
        };
        publish_terminal(&self.publisher, terminal).await;

        result.map_err(|e| EventError::Handler(e.to_string()))
    }
}

pub struct UserGroupHandlers<P, A> {
    groups: Arc<GroupService>,
    publisher: Arc<EventPublisher<P, A>>,
}

impl<P, A> UserGroupHandlers<P, A>
where
    P: QueueProvider,
    A: AuditStore,
{
    pub fn new(groups: Arc<GroupService>, publisher: Arc<EventPublisher<P, A>>) -> Self {
        Self { groups, publisher }
    }

    pub async fn handle_assign(&self, event: Event) -> Result<(), EventError> {
        let payload: UserGroupPayload = serde_json::from_value(event.payload)?;
        info!(
            group_id = %payload.group_id,
            user_count = payload.user_ids.len(),
            "processing user-group assign request"
        );

        let result = self
            .groups
            .assign_users(&payload.group_id, &payload.user_ids)
            .await;

        let terminal = match &result {
            Ok(()) => Event::new(
                USER_GROUP_ASSIGN_SUCCESS,
                serde_json::to_value(&payload)?,
            ),
            Err(e) => {
                error!(group_id = %payload.group_id, error = %e, "failed to assign users to group");
                Event::new(
                    USER_GROUP_ASSIGN_FAILED,
                    serde_json::to_value(ErrorPayload {
                        user_ids: payload.user_ids.clone(),
                        role_id: None,
                        group_id: Some(payload.group_id.clone()),
                        error: e.to_string(),
                    })?,
                )
            }
        };
        publish_terminal(&self.publisher, terminal).await;

        result.map_err(|e| EventError::Handler(e.to_string()))
    }

    pub async fn handle_remove(&self, event: Event) -> Result<(), EventError> {
        let payload: UserGroupPayload = serde_json::from_value(event.payload)?;
        info!(
            group_id = %payload.group_id,
            user_count = payload.user_ids.len(),
            "processing user-group remove request"
        );

        let result = self
            .groups
            .remove_users(&payload.group_id, &payload.user_ids)
            .await;

        let terminal = match &result {
            Ok(()) => Event::new(
                USER_GROUP_REMOVE_SUCCESS,
                serde_json::to_value(&payload)?,
            ),
            Err(e) => {
                error!(group_id = %payload.group_id, error = %e, "failed to remove users from group");
                Event::new(
                    USER_GROUP_REMOVE_FAILED,
                    serde_json::to_value(ErrorPayload {
                        user_ids: payload.user_ids.clone(),
                        role_id: None,
                        group_id: Some(payload.group_id.clone()),
                        error: e.to_string(),
                    })?,
                )
            }
        };
        publish_terminal(&self.publisher, terminal).await;

        result.map_err(|e| EventError::Handler(e.to_string()))
    }
}

async fn publish_terminal<P: QueueProvider, A: AuditStore>(
    publisher: &EventPublisher<P, A>,
    event: Event,
) {
    if let Err(e) = publisher.publish_with_retry(&event, DEFAULT_MAX_RETRIES).await {
        error!(
            event_type = %event.event_type,
            error = %e,
            "failed to publish completion event"
        );
    }
}

/// Wire the four request types into the router. Registration happens
/// before any consumer starts; the router is read-only afterwards.
pub fn register_handlers<P, A>(
    router: &mut EventRouter,
    roles: Arc<RoleService>,
    groups: Arc<GroupService>,
    publisher: Arc<EventPublisher<P, A>>,
) where
    P: QueueProvider + 'static,
    A: AuditStore + 'static,
{
    let role_handlers = Arc::new(UserRoleHandlers::new(roles, Arc::clone(&publisher)));
    let group_handlers = Arc::new(UserGroupHandlers::new(groups, publisher));

    let handlers = Arc::clone(&role_handlers);
    router.register(USER_ROLE_ASSIGN_REQUEST, move |event| {
        let handlers = Arc::clone(&handlers);
        async move { handlers.handle_assign(event).await }
    });

    let handlers = role_handlers;
    router.register(USER_ROLE_REMOVE_REQUEST, move |event| {
        let handlers = Arc::clone(&handlers);
        async move { handlers.handle_remove(event).await }
    });

    let handlers = Arc::clone(&group_handlers);
    router.register(USER_GROUP_ASSIGN_REQUEST, move |event| {
        let handlers = Arc::clone(&handlers);
        async move { handlers.handle_assign(event).await }
    });

    let handlers = group_handlers;
    router.register(USER_GROUP_REMOVE_REQUEST, move |event| {
        let handlers = Arc::clone(&handlers);
        async move { handlers.handle_remove(event).await }
    });
}
