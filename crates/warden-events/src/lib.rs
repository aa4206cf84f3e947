pub mod consumer;
pub mod error;
pub mod health;
pub mod manager;
pub mod memory;
pub mod provider;
pub mod publisher;
pub mod rabbitmq;
pub mod router;

pub use consumer::EventConsumer;
pub use error::EventError;
pub use health::HealthChecker;
pub use manager::{EXCHANGE_NAME, EventManager, QUEUE_NAME, REQUEST_BINDING};
pub use memory::InMemoryProvider;
pub use provider::{MessageHandler, QueueProvider};
pub use publisher::{EventPublisher, EventSink};
pub use rabbitmq::RabbitMqProvider;
pub use router::EventRouter;

use std::time::Duration;

/// Exponential back-off shared by the publisher and the consumer:
/// 1 s, 2 s, 4 s, … for attempts 0, 1, 2, …
pub(crate) fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_secs(1u64 << attempt)
}
