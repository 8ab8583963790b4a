//! Consumer for the fan-out continuation topic.

use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::{BorrowedMessage, Message};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::config::KafkaConfig;
use crate::error::{ServiceError, ServiceResult};
use crate::fanout::FanoutCoordinator;
use crate::models::FanOutMessage;

const ERROR_BACKOFF: Duration = Duration::from_secs(1);
const MAX_ERROR_BACKOFF: Duration = Duration::from_secs(30);

/// Drives the fan-out coordinator from the fan-out topic.
///
/// Offsets are committed only after a successful step: a failed page fetch
/// or enqueue leaves the message uncommitted so the transport redelivers
/// the whole step to another worker.
pub struct FanOutConsumer {
    consumer: StreamConsumer,
    coordinator: Arc<FanoutCoordinator>,
    topic: String,
}

impl FanOutConsumer {
    pub fn new(config: &KafkaConfig, coordinator: Arc<FanoutCoordinator>) -> ServiceResult<Self> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &config.brokers)
            .set("group.id", &config.group_id)
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", "earliest")
            .set("session.timeout.ms", "30000")
            .set("enable.partition.eof", "false")
            .create()
            .map_err(|e| ServiceError::Queue(format!("failed to create fan-out consumer: {}", e)))?;

        consumer
            .subscribe(&[config.fan_out_topic.as_str()])
            .map_err(|e| ServiceError::Queue(format!("failed to subscribe: {}", e)))?;

        info!(
            topic = %config.fan_out_topic,
            group = %config.group_id,
            "Fan-out consumer initialized"
        );

        Ok(Self {
            consumer,
            coordinator,
            topic: config.fan_out_topic.clone(),
        })
    }

    pub async fn run(self) -> ServiceResult<()> {
        info!(topic = %self.topic, "Starting fan-out consumer loop");
        let mut backoff = ERROR_BACKOFF;

        loop {
            match self.consumer.recv().await {
                Ok(message) => {
                    backoff = ERROR_BACKOFF;
                    self.handle(&message).await;
                }
                Err(e) => {
                    error!(error = %e, "Fan-out consumer error");
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(MAX_ERROR_BACKOFF);
                }
            }
        }
    }

    async fn handle(&self, message: &BorrowedMessage<'_>) {
        let Some(payload) = message.payload() else {
            warn!("Fan-out message without payload, skipping");
            self.commit(message);
            return;
        };

        let msg: FanOutMessage = match serde_json::from_slice(payload) {
            Ok(msg) => msg,
            Err(e) => {
                warn!(error = %e, "Failed to deserialize fan-out message, skipping");
                self.commit(message);
                return;
            }
        };

        let post_id = msg.post.post_id;
        match self.coordinator.step(msg).await {
            Ok(outcome) => {
                debug!(post_id = %post_id, outcome = ?outcome, "Fan-out step processed");
                self.commit(message);
            }
            Err(ServiceError::Contract(reason)) => {
                error!(post_id = %post_id, reason = %reason, "Rejecting malformed fan-out message");
                self.commit(message);
            }
            Err(e) => {
                // Leave the offset uncommitted; the step is idempotent and
                // will be redelivered.
                error!(
                    post_id = %post_id,
                    error = %e,
                    "Fan-out step failed, leaving message for redelivery"
                );
            }
        }
    }

    fn commit(&self, message: &BorrowedMessage<'_>) {
        if let Err(e) = self.consumer.commit_message(message, CommitMode::Async) {
            warn!(error = %e, "Failed to commit fan-out offset");
        }
    }
}
