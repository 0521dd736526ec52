//! Bridge task with retry logic

use crate::{
    metrics::{FEED_RECEIVE_TOTAL, NOTICE_DELIVERY_DURATION, NOTICE_DELIVERY_TOTAL},
    notice::SettlementNotice,
    Error, Result,
};
use async_trait::async_trait;
use rotation_core::Distribution;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Bridge configuration
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Max delivery attempts per notice
    pub max_retry_attempts: u32,

    /// Initial retry delay
    pub initial_retry_delay: Duration,

    /// Max retry delay
    pub max_retry_delay: Duration,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            max_retry_attempts: 3,
            initial_retry_delay: Duration::from_millis(100),
            max_retry_delay: Duration::from_secs(2),
        }
    }
}

/// Settlement collaborator endpoint
#[async_trait]
pub trait SettlementSink: Send + Sync {
    /// Deliver one notice; errors trigger the bridge's retry policy
    async fn deliver(&self, notice: &SettlementNotice) -> Result<()>;
}

/// Forwards completed distributions from the engine feed to a sink
pub struct SettlementBridge {
    sink: Arc<dyn SettlementSink>,
    config: BridgeConfig,
}

impl SettlementBridge {
    /// Create new bridge
    pub fn new(sink: Arc<dyn SettlementSink>, config: BridgeConfig) -> Self {
        Self { sink, config }
    }

    /// Spawn the bridge onto the runtime
    pub fn spawn(
        sink: Arc<dyn SettlementSink>,
        config: BridgeConfig,
        feed: broadcast::Receiver<Distribution>,
    ) -> JoinHandle<()> {
        let bridge = Self::new(sink, config);
        tokio::spawn(async move {
            bridge.run(feed).await;
        })
    }

    /// Consume the feed until it closes
    ///
    /// A notice that exhausts its retries is dropped with an error log; the
    /// audit trail still holds the distribution, so reconciliation can
    /// replay it out of band.
    pub async fn run(self, mut feed: broadcast::Receiver<Distribution>) {
        loop {
            match feed.recv().await {
                Ok(distribution) => {
                    FEED_RECEIVE_TOTAL.with_label_values(&["ok"]).inc();
                    let notice = SettlementNotice::new(distribution);

                    if let Err(e) = self.deliver_with_retry(&notice).await {
                        error!(
                            notice_id = %notice.id,
                            distribution_id = %notice.distribution.id,
                            "Dropping settlement notice: {}",
                            e
                        );
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    FEED_RECEIVE_TOTAL.with_label_values(&["lagged"]).inc();
                    warn!(skipped, "Distribution feed lagged; notices skipped");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    info!("Distribution feed closed, settlement bridge stopping");
                    return;
                }
            }
        }
    }

    /// Deliver with exponential backoff retry
    pub async fn deliver_with_retry(&self, notice: &SettlementNotice) -> Result<()> {
        let start = Instant::now();
        let mut attempts = 0;
        let mut delay = self.config.initial_retry_delay;

        loop {
            attempts += 1;

            match self.sink.deliver(notice).await {
                Ok(()) => {
                    let duration = start.elapsed().as_secs_f64();
                    NOTICE_DELIVERY_TOTAL.with_label_values(&["success"]).inc();
                    NOTICE_DELIVERY_DURATION
                        .with_label_values(&["success"])
                        .observe(duration);

                    info!(
                        notice_id = %notice.id,
                        distribution_id = %notice.distribution.id,
                        amount = %notice.distribution.amount,
                        attempts,
                        "Settlement notice delivered"
                    );
                    return Ok(());
                }
                Err(e) if attempts < self.config.max_retry_attempts => {
                    warn!(
                        notice_id = %notice.id,
                        attempts,
                        "Settlement delivery failed, retrying in {:?}: {}",
                        delay,
                        e
                    );
                    tokio::time::sleep(delay).await;
                    delay = (delay * 2).min(self.config.max_retry_delay);
                }
                Err(e) => {
                    NOTICE_DELIVERY_TOTAL.with_label_values(&["error"]).inc();
                    NOTICE_DELIVERY_DURATION
                        .with_label_values(&["error"])
                        .observe(start.elapsed().as_secs_f64());
                    return Err(Error::Delivery(format!(
                        "{} (after {} attempts)",
                        e, attempts
                    )));
                }
            }
        }
    }
}

/// In-memory sink for tests and local wiring
#[derive(Default)]
pub struct MemorySink {
    delivered: parking_lot::Mutex<Vec<SettlementNotice>>,
}

impl MemorySink {
    /// Create an empty sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Notices delivered so far
    pub fn delivered(&self) -> Vec<SettlementNotice> {
        self.delivered.lock().clone()
    }
}

#[async_trait]
impl SettlementSink for MemorySink {
    async fn deliver(&self, notice: &SettlementNotice) -> Result<()> {
        self.delivered.lock().push(notice.clone());
        Ok(())
    }
}
