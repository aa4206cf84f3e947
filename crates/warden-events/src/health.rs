//! Periodic broker liveness checks with reconnect-on-failure.
//!
//! One reconnect attempt per tick; a failed reconnect waits for the next
//! tick rather than retrying inline.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::provider::QueueProvider;

pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(30);

pub struct HealthChecker<P> {
    provider: Arc<P>,
    interval: Duration,
    stop: CancellationToken,
}

impl<P: QueueProvider> HealthChecker<P> {
    pub fn new(provider: Arc<P>, interval: Option<Duration>) -> Self {
        Self {
            provider,
            interval: interval.unwrap_or(DEFAULT_INTERVAL),
            stop: CancellationToken::new(),
        }
    }

    /// Run until stopped. Intended to be spawned.
    pub async fn run(&self) {
        let mut ticker = tokio::time::interval(self.interval);
        // the first tick of a tokio interval fires immediately
        ticker.tick().await;

        info!(interval_secs = self.interval.as_secs(), "health checker started");

        loop {
            tokio::select! {
                _ = self.stop.cancelled() => {
                    info!("health checker stopped");
                    return;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.provider.health_check().await {
                        error!(error = %e, "health check failed, attempting reconnection");
                        match self.provider.connect().await {
                            Ok(()) => info!("reconnection successful"),
                            Err(e) => error!(error = %e, "reconnection failed"),
                        }
                    }
                }
            }
        }
    }

    pub fn stop(&self) {
        self.stop.cancel();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::error::EventError;
    use crate::provider::MessageHandler;

    /// Scripted provider: health checks fail until `connect` is called.
    #[derive(Default)]
    struct FlakyProvider {
        log: Mutex<Vec<&'static str>>,
        healthy: Mutex<bool>,
    }

    impl QueueProvider for FlakyProvider {
        async fn connect(&self) -> Result<(), EventError> {
            self.log.lock().unwrap().push("connect");
            *self.healthy.lock().unwrap() = true;
            Ok(())
        }
        async fn close(&self) -> Result<(), EventError> {
            Ok(())
        }
        async fn declare_exchange(&self, _: &str, _: &str) -> Result<(), EventError> {
            Ok(())
        }
        async fn declare_queue(&self, queue: &str) -> Result<String, EventError> {
            Ok(queue.to_string())
        }
        async fn bind_queue(&self, _: &str, _: &str, _: &str) -> Result<(), EventError> {
            Ok(())
        }
        async fn publish(&self, _: &str, _: &str, _: &[u8]) -> Result<(), EventError> {
            Ok(())
        }
        async fn consume(&self, _: &str, _: MessageHandler) -> Result<(), EventError> {
            Ok(())
        }
        async fn health_check(&self) -> Result<(), EventError> {
            self.log.lock().unwrap().push("health_check");
            if *self.healthy.lock().unwrap() {
                Ok(())
            } else {
                Err(EventError::NoConnections)
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn failed_check_triggers_one_reconnect_per_tick() {
        let provider = Arc::new(FlakyProvider::default());
        let checker = Arc::new(HealthChecker::new(
            Arc::clone(&provider),
            Some(Duration::from_secs(30)),
        ));

        let running = Arc::clone(&checker);
        let task = tokio::spawn(async move { running.run().await });

        // two ticks: the first reconnects, the second finds the provider
        // healthy again
        tokio::time::sleep(Duration::from_secs(61)).await;
        checker.stop();
        task.await.unwrap();

        let log = provider.log.lock().unwrap().clone();
        assert_eq!(log, vec!["health_check", "connect", "health_check"]);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_halts_the_loop() {
        let provider = Arc::new(FlakyProvider::default());
        *provider.healthy.lock().unwrap() = true;

        let checker = Arc::new(HealthChecker::new(
            Arc::clone(&provider),
            Some(Duration::from_secs(30)),
        ));
        let running = Arc::clone(&checker);
        let task = tokio::spawn(async move { running.run().await });

        tokio::time::sleep(Duration::from_secs(31)).await;
        checker.stop();
        task.await.unwrap();

        let checks = provider
            .log
            .lock()
            .unwrap()
            .iter()
            .filter(|e| **e == "health_check")
            .count();
        assert_eq!(checks, 1);
    }
}
