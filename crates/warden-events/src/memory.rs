//! In-memory queue provider for tests and local development.
//!
//! Declared topology is recorded, published messages are kept for
//! inspection, and deliveries run inline: a publish routes through the
//! topic bindings and invokes matching consumers before returning. A
//! handler error is recorded as a nack (the broker would requeue).

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use crate::error::EventError;
use crate::provider::{MessageHandler, QueueProvider};

#[derive(Debug, Clone)]
pub struct PublishedMessage {
    pub exchange: String,
    pub routing_key: String,
    pub body: Vec<u8>,
}

#[derive(Clone)]
struct Binding {
    queue: String,
    exchange: String,
    pattern: String,
}

#[derive(Default)]
struct Inner {
    connected: bool,
    closed: bool,
    exchanges: HashMap<String, String>,
    queues: HashSet<String>,
    bindings: Vec<Binding>,
    consumers: HashMap<String, Vec<MessageHandler>>,
    messages: Vec<PublishedMessage>,
    nacked: Vec<PublishedMessage>,
    fail_publishes: usize,
}

#[derive(Clone, Default)]
pub struct InMemoryProvider {
    state: Arc<Mutex<Inner>>,
}

impl InMemoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` publishes fail with a transport error.
    pub fn fail_publishes(&self, count: usize) {
        self.state.lock().unwrap().fail_publishes = count;
    }

    /// Declared exchanges as `(name, kind)` pairs.
    pub fn exchanges(&self) -> Vec<(String, String)> {
        self.state
            .lock()
            .unwrap()
            .exchanges
            .iter()
            .map(|(name, kind)| (name.clone(), kind.clone()))
            .collect()
    }

    /// Every message published so far, in order.
    pub fn messages(&self) -> Vec<PublishedMessage> {
        self.state.lock().unwrap().messages.clone()
    }

    /// Messages whose handler returned an error (the broker would have
    /// requeued these).
    pub fn nacked(&self) -> Vec<PublishedMessage> {
        self.state.lock().unwrap().nacked.clone()
    }

    pub fn messages_for(&self, routing_key: &str) -> Vec<PublishedMessage> {
        self.state
            .lock()
            .unwrap()
            .messages
            .iter()
            .filter(|m| m.routing_key == routing_key)
            .cloned()
            .collect()
    }
}

/// AMQP topic matching: `*` matches exactly one word, `#` matches zero or
/// more.
fn topic_matches(pattern: &str, key: &str) -> bool {
    fn matches(pattern: &[&str], key: &[&str]) -> bool {
        match (pattern.first(), key.first()) {
            (None, None) => true,
            (Some(&"#"), _) => {
                matches(&pattern[1..], key) || (!key.is_empty() && matches(pattern, &key[1..]))
            }
            (Some(&"*"), Some(_)) => matches(&pattern[1..], &key[1..]),
            (Some(&word), Some(&part)) if word == part => matches(&pattern[1..], &key[1..]),
            _ => false,
        }
    }
    let pattern: Vec<&str> = pattern.split('.').collect();
    let key: Vec<&str> = key.split('.').collect();
    matches(&pattern, &key)
}

impl QueueProvider for InMemoryProvider {
    async fn connect(&self) -> Result<(), EventError> {
        let mut state = self.state.lock().unwrap();
        if state.closed {
            return Err(EventError::Closed);
        }
        state.connected = true;
        Ok(())
    }

    async fn close(&self) -> Result<(), EventError> {
        let mut state = self.state.lock().unwrap();
        state.closed = true;
        state.connected = false;
        state.consumers.clear();
        Ok(())
    }

    async fn declare_exchange(&self, exchange: &str, kind: &str) -> Result<(), EventError> {
        let mut state = self.state.lock().unwrap();
        state
            .exchanges
            .insert(exchange.to_string(), kind.to_string());
        Ok(())
    }

    async fn declare_queue(&self, queue: &str) -> Result<String, EventError> {
        let mut state = self.state.lock().unwrap();
        state.queues.insert(queue.to_string());
        Ok(queue.to_string())
    }

    async fn bind_queue(
        &self,
        queue: &str,
        exchange: &str,
        routing_key: &str,
    ) -> Result<(), EventError> {
        let mut state = self.state.lock().unwrap();
        state.bindings.push(Binding {
            queue: queue.to_string(),
            exchange: exchange.to_string(),
            pattern: routing_key.to_string(),
        });
        Ok(())
    }

    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        body: &[u8],
    ) -> Result<(), EventError> {
        let message = PublishedMessage {
            exchange: exchange.to_string(),
            routing_key: routing_key.to_string(),
            body: body.to_vec(),
        };

        let handlers: Vec<MessageHandler> = {
            let mut state = self.state.lock().unwrap();
            if state.closed {
                return Err(EventError::Closed);
            }
            if !state.connected {
                return Err(EventError::NoConnections);
            }
            if state.fail_publishes > 0 {
                state.fail_publishes -= 1;
                return Err(EventError::Transport("injected publish failure".to_string()));
            }

            state.messages.push(message.clone());

            state
                .bindings
                .iter()
                .filter(|b| b.exchange == exchange && topic_matches(&b.pattern, routing_key))
                .flat_map(|b| state.consumers.get(&b.queue).into_iter().flatten())
                .cloned()
                .collect()
        };

        for handler in handlers {
            if handler(message.body.clone()).await.is_err() {
                self.state.lock().unwrap().nacked.push(message.clone());
            }
        }

        Ok(())
    }

    async fn consume(&self, queue: &str, handler: MessageHandler) -> Result<(), EventError> {
        let mut state = self.state.lock().unwrap();
        if state.closed {
            return Err(EventError::Closed);
        }
        if !state.queues.contains(queue) {
            return Err(EventError::Transport(format!("unknown queue: {queue}")));
        }
        state
            .consumers
            .entry(queue.to_string())
            .or_default()
            .push(handler);
        Ok(())
    }

    async fn health_check(&self) -> Result<(), EventError> {
        let state = self.state.lock().unwrap();
        if state.closed {
            return Err(EventError::Closed);
        }
        if !state.connected {
            return Err(EventError::NoConnections);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topic_star_matches_exactly_one_word() {
        assert!(topic_matches("rbac.*.*.request", "rbac.user_role.assign.request"));
        assert!(topic_matches("rbac.*.*.request", "rbac.user_group.remove.request"));
        assert!(!topic_matches("rbac.*.*.request", "rbac.user_role.assign.success"));
        assert!(!topic_matches("rbac.*.*.request", "rbac.user_role.request"));
        assert!(!topic_matches("rbac.*.*.request", "rbac.a.b.c.request"));
    }

    #[test]
    fn topic_hash_matches_any_tail() {
        assert!(topic_matches("rbac.#", "rbac.user_role.assign.request"));
        assert!(topic_matches("#", "anything.at.all"));
        assert!(topic_matches("rbac.#.request", "rbac.user_role.assign.request"));
        assert!(!topic_matches("rbac.#", "other.user_role"));
    }

    #[test]
    fn exact_patterns_require_exact_keys() {
        assert!(topic_matches("a.b", "a.b"));
        assert!(!topic_matches("a.b", "a.c"));
    }

    #[tokio::test]
    async fn publish_without_connect_fails() {
        let provider = InMemoryProvider::new();
        assert!(matches!(
            provider.publish("x", "k", b"{}").await,
            Err(EventError::NoConnections)
        ));
    }

    #[tokio::test]
    async fn unbound_routing_keys_are_recorded_but_not_delivered() {
        let provider = InMemoryProvider::new();
        provider.connect().await.unwrap();
        provider.declare_exchange("x", "topic").await.unwrap();
        provider.declare_queue("q").await.unwrap();
        provider.bind_queue("q", "x", "rbac.*.*.request").await.unwrap();

        let delivered = Arc::new(Mutex::new(0usize));
        let seen = Arc::clone(&delivered);
        provider
            .consume(
                "q",
                Arc::new(move |_body| {
                    let seen = Arc::clone(&seen);
                    Box::pin(async move {
                        *seen.lock().unwrap() += 1;
                        Ok(())
                    })
                }),
            )
            .await
            .unwrap();

        provider
            .publish("x", "rbac.user_role.assign.success", b"{}")
            .await
            .unwrap();
        provider
            .publish("x", "rbac.user_role.assign.request", b"{}")
            .await
            .unwrap();

        assert_eq!(*delivered.lock().unwrap(), 1);
        assert_eq!(provider.messages().len(), 2);
    }
}
