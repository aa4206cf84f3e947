//! In-memory event routing: event-type string to handler.
//!
//! The router is populated once during bootstrap and read-only afterwards;
//! no consumer starts before registration finishes.

use std::collections::HashMap;

use futures::future::BoxFuture;
use warden_core::event::Event;

use crate::error::EventError;

type Handler = Box<dyn Fn(Event) -> BoxFuture<'static, Result<(), EventError>> + Send + Sync>;

#[derive(Default)]
pub struct EventRouter {
    handlers: HashMap<String, Handler>,
}

impl EventRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F, Fut>(&mut self, event_type: impl Into<String>, handler: F)
    where
        F: Fn(Event) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), EventError>> + Send + 'static,
    {
        let boxed = move |event: Event| -> BoxFuture<'static, Result<(), EventError>> {
            Box::pin(handler(event))
        };
        self.handlers.insert(event_type.into(), Box::new(boxed));
    }

    pub async fn dispatch(&self, event: Event) -> Result<(), EventError> {
        let handler = self
            .handlers
            .get(&event.event_type)
            .ok_or_else(|| EventError::NoHandler(event.event_type.clone()))?;
        handler(event).await
    }
}
