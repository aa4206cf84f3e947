//! RabbitMQ binding of the queue-provider contract, built on lapin.
//!
//! The provider owns a pool of up to `max_connections` connections, each
//! with up to `max_channels_per_conn` channels. Channel selection is
//! round-robin: first across connections, then within a connection the
//! pool grows until its cap and round-robins afterwards. A channel
//! observed closed is replaced in place. All pool state sits behind one
//! RwLock; the indices advance under the write lock.

use chrono::Utc;
use futures::StreamExt;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicPublishOptions, BasicQosOptions,
    ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions,
};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties, ExchangeKind};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::error::EventError;
use crate::provider::{MessageHandler, QueueProvider};

const PREFETCH_COUNT: u16 = 10;
const CLOSE_REPLY_CODE: u16 = 200;

#[derive(Default)]
struct PoolState {
    connections: Vec<Connection>,
    channel_pools: Vec<Vec<Channel>>,
    next_connection: usize,
    next_channel: Vec<usize>,
    consumer_tokens: Vec<CancellationToken>,
    closed: bool,
}

pub struct RabbitMqProvider {
    url: String,
    max_connections: usize,
    max_channels_per_conn: usize,
    state: RwLock<PoolState>,
}

impl RabbitMqProvider {
    pub fn new(
        url: &str,
        max_connections: usize,
        max_channels_per_conn: usize,
    ) -> Result<Self, EventError> {
        if url.is_empty() {
            return Err(EventError::Config("RabbitMQ URL is required".to_string()));
        }
        Ok(Self {
            url: url.to_string(),
            max_connections: max_connections.max(1),
            max_channels_per_conn: max_channels_per_conn.max(1),
            state: RwLock::new(PoolState::default()),
        })
    }

    async fn get_channel(&self) -> Result<Channel, EventError> {
        let mut guard = self.state.write().await;
        let state = &mut *guard;

        if state.closed {
            return Err(EventError::Closed);
        }
        if state.connections.is_empty() {
            return Err(EventError::NoConnections);
        }

        let conn_index = state.next_connection;
        state.next_connection = (state.next_connection + 1) % state.connections.len();

        let conn = &state.connections[conn_index];
        if !conn.status().connected() {
            return Err(EventError::ConnectionClosed(conn_index));
        }

        if state.channel_pools[conn_index].len() < self.max_channels_per_conn {
            let channel = conn.create_channel().await?;
            state.channel_pools[conn_index].push(channel.clone());
            return Ok(channel);
        }

        let pool_len = state.channel_pools[conn_index].len();
        let channel_index = state.next_channel[conn_index];
        state.next_channel[conn_index] = (channel_index + 1) % pool_len;

        let channel = state.channel_pools[conn_index][channel_index].clone();
        if !channel.status().connected() {
            let replacement = conn.create_channel().await?;
            state.channel_pools[conn_index][channel_index] = replacement.clone();
            return Ok(replacement);
        }

        Ok(channel)
    }
}

async fn close_pool(state: &mut PoolState) {
    for pool in &state.channel_pools {
        for channel in pool {
            if channel.status().connected() {
                let _ = channel.close(CLOSE_REPLY_CODE, "").await;
            }
        }
    }
    for conn in &state.connections {
        if conn.status().connected() {
            let _ = conn.close(CLOSE_REPLY_CODE, "").await;
        }
    }
    state.connections.clear();
    state.channel_pools.clear();
    state.next_channel.clear();
    state.next_connection = 0;
}

impl QueueProvider for RabbitMqProvider {
    async fn connect(&self) -> Result<(), EventError> {
        let mut guard = self.state.write().await;
        let state = &mut *guard;

        if state.closed {
            return Err(EventError::Closed);
        }

        close_pool(state).await;

        for i in 0..self.max_connections {
            let conn = match Connection::connect(&self.url, ConnectionProperties::default()).await
            {
                Ok(conn) => conn,
                Err(e) => {
                    close_pool(state).await;
                    return Err(EventError::Transport(format!(
                        "failed to connect to RabbitMQ (connection {i}): {e}"
                    )));
                }
            };
            state.connections.push(conn);
            state.channel_pools.push(Vec::new());
            state.next_channel.push(0);
            info!(connection_index = i, "RabbitMQ connection established");
        }

        info!(connections = self.max_connections, "RabbitMQ provider connected");
        Ok(())
    }

    async fn close(&self) -> Result<(), EventError> {
        let mut guard = self.state.write().await;
        let state = &mut *guard;

        state.closed = true;

        for token in state.consumer_tokens.drain(..) {
            token.cancel();
        }

        close_pool(state).await;
        Ok(())
    }

    async fn declare_exchange(&self, exchange: &str, kind: &str) -> Result<(), EventError> {
        let channel = self.get_channel().await?;
        let exchange_kind = match kind {
            "topic" => ExchangeKind::Topic,
            "direct" => ExchangeKind::Direct,
            "fanout" => ExchangeKind::Fanout,
            other => ExchangeKind::Custom(other.to_string()),
        };
        channel
            .exchange_declare(
                exchange,
                exchange_kind,
                ExchangeDeclareOptions {
                    durable: true,
                    ..ExchangeDeclareOptions::default()
                },
                FieldTable::default(),
            )
            .await?;
        info!(exchange, kind, "exchange declared");
        Ok(())
    }

    async fn declare_queue(&self, queue: &str) -> Result<String, EventError> {
        let channel = self.get_channel().await?;
        let declared = channel
            .queue_declare(
                queue,
                QueueDeclareOptions {
                    durable: true,
                    ..QueueDeclareOptions::default()
                },
                FieldTable::default(),
            )
            .await?;
        info!(queue = %declared.name(), "queue declared");
        Ok(declared.name().as_str().to_string())
    }

    async fn bind_queue(
        &self,
        queue: &str,
        exchange: &str,
        routing_key: &str,
    ) -> Result<(), EventError> {
        let channel = self.get_channel().await?;
        channel
            .queue_bind(
                queue,
                exchange,
                routing_key,
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await?;
        info!(queue, exchange, routing_key, "queue bound to exchange");
        Ok(())
    }

    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        body: &[u8],
    ) -> Result<(), EventError> {
        let channel = self.get_channel().await?;

        let properties = BasicProperties::default()
            .with_content_type("application/json".into())
            .with_delivery_mode(2)
            .with_timestamp(Utc::now().timestamp().max(0) as u64);

        channel
            .basic_publish(
                exchange,
                routing_key,
                BasicPublishOptions::default(),
                body,
                properties,
            )
            .await?
            .await?;

        Ok(())
    }

    async fn consume(&self, queue: &str, handler: MessageHandler) -> Result<(), EventError> {
        let channel = self.get_channel().await?;

        channel
            .basic_qos(PREFETCH_COUNT, BasicQosOptions::default())
            .await?;

        let mut deliveries = channel
            .basic_consume(
                queue,
                "",
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await?;

        let token = CancellationToken::new();
        {
            let mut state = self.state.write().await;
            if state.closed {
                return Err(EventError::Closed);
            }
            state.consumer_tokens.push(token.clone());
        }

        let queue = queue.to_string();
        tokio::spawn(async move {
            info!(queue = %queue, "started consuming from queue");

            loop {
                tokio::select! {
                    _ = token.cancelled() => {
                        info!(queue = %queue, "consumer stopped");
                        return;
                    }
                    delivery = deliveries.next() => {
                        let Some(delivery) = delivery else {
                            warn!(queue = %queue, "message channel closed");
                            return;
                        };
                        let mut delivery = match delivery {
                            Ok(delivery) => delivery,
                            Err(e) => {
                                error!(queue = %queue, error = %e, "delivery error");
                                continue;
                            }
                        };

                        let body = std::mem::take(&mut delivery.data);
                        match handler(body).await {
                            Ok(()) => {
                                if let Err(e) = delivery.acker.ack(BasicAckOptions::default()).await {
                                    error!(queue = %queue, error = %e, "failed to ack message");
                                }
                            }
                            Err(e) => {
                                error!(queue = %queue, error = %e, "failed to process message");
                                let nack = BasicNackOptions {
                                    requeue: true,
                                    ..BasicNackOptions::default()
                                };
                                if let Err(e) = delivery.acker.nack(nack).await {
                                    error!(queue = %queue, error = %e, "failed to nack message");
                                }
                            }
                        }
                    }
                }
            }
        });

        Ok(())
    }

    async fn health_check(&self) -> Result<(), EventError> {
        let state = self.state.read().await;

        if state.closed {
            return Err(EventError::Closed);
        }
        if state.connections.is_empty() {
            return Err(EventError::NoConnections);
        }

        for (i, conn) in state.connections.iter().enumerate() {
            if conn.status().connected() {
                return Ok(());
            }
            warn!(connection_index = i, "connection is closed");
        }

        Err(EventError::Transport("all connections are closed".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_rejects_an_empty_url() {
        assert!(matches!(
            RabbitMqProvider::new("", 1, 10),
            Err(EventError::Config(_))
        ));
    }

    #[tokio::test]
    async fn health_check_fails_before_connect() {
        let provider = RabbitMqProvider::new("amqp://localhost:5672", 1, 10).unwrap();
        assert!(matches!(
            provider.health_check().await,
            Err(EventError::NoConnections)
        ));
    }

    #[tokio::test]
    async fn operations_fail_once_closed() {
        let provider = RabbitMqProvider::new("amqp://localhost:5672", 1, 10).unwrap();
        provider.close().await.unwrap();

        assert!(matches!(provider.connect().await, Err(EventError::Closed)));
        assert!(matches!(
            provider.health_check().await,
            Err(EventError::Closed)
        ));
        assert!(matches!(
            provider.publish("x", "k", b"{}").await,
            Err(EventError::Closed)
        ));
    }
}
