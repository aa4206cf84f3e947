//! The broker contract. One concrete binding exists (RabbitMQ); the
//! in-memory provider backs the pipeline tests.

use std::sync::Arc;

use futures::future::BoxFuture;

use crate::error::EventError;

/// Callback invoked once per delivered message. A success return means
/// ack; an error return means nack with requeue. Handlers outlive the
/// registration call, so the callback is boxed and shared.
pub type MessageHandler =
    Arc<dyn Fn(Vec<u8>) -> BoxFuture<'static, Result<(), EventError>> + Send + Sync>;

pub trait QueueProvider: Send + Sync {
    /// (Re)establish the connection pool, closing any prior connections
    /// first. Fails once the provider has been closed.
    fn connect(&self) -> impl Future<Output = Result<(), EventError>> + Send;

    /// Mark the provider closed, cancel all consumers, and close every
    /// channel and connection.
    fn close(&self) -> impl Future<Output = Result<(), EventError>> + Send;

    /// Declare a durable exchange. Idempotent.
    fn declare_exchange(
        &self,
        exchange: &str,
        kind: &str,
    ) -> impl Future<Output = Result<(), EventError>> + Send;

    /// Declare a durable queue and return its name. Idempotent.
    fn declare_queue(
        &self,
        queue: &str,
    ) -> impl Future<Output = Result<String, EventError>> + Send;

    /// Bind a queue to an exchange under a routing-key pattern.
    fn bind_queue(
        &self,
        queue: &str,
        exchange: &str,
        routing_key: &str,
    ) -> impl Future<Output = Result<(), EventError>> + Send;

    /// Publish one message with persistent delivery.
    fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        body: &[u8],
    ) -> impl Future<Output = Result<(), EventError>> + Send;

    /// Start a long-running subscription delivering messages one at a
    /// time to `handler`. Each registration is individually cancelled
    /// when the provider closes.
    fn consume(
        &self,
        queue: &str,
        handler: MessageHandler,
    ) -> impl Future<Output = Result<(), EventError>> + Send;

    /// Ok iff at least one connection is alive.
    fn health_check(&self) -> impl Future<Output = Result<(), EventError>> + Send;
}
