//! Consumer for the batch-write topic.

use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::{BorrowedMessage, Message};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::cache::FeedCacheStore;
use crate::config::KafkaConfig;
use crate::error::{ServiceError, ServiceResult};
use crate::fanout::{apply_batch_write, BatchWriter};
use crate::models::BatchWriteMessage;

const ERROR_BACKOFF: Duration = Duration::from_secs(1);
const MAX_ERROR_BACKOFF: Duration = Duration::from_secs(30);

/// Applies batch-write jobs to the feed cache store.
///
/// Jobs missing the author snapshot are rejected as contract violations.
/// Store-throttling is absorbed inside the batch writer; any other failure
/// leaves the offset uncommitted for redelivery, which is safe because the
/// write key `(viewer_id, created_at, post_id)` makes re-runs idempotent.
pub struct FeedWriteConsumer {
    consumer: StreamConsumer,
    store: Arc<dyn FeedCacheStore>,
    writer: BatchWriter,
    topic: String,
}

impl FeedWriteConsumer {
    pub fn new(
        config: &KafkaConfig,
        store: Arc<dyn FeedCacheStore>,
        writer: BatchWriter,
    ) -> ServiceResult<Self> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &config.brokers)
            .set("group.id", &config.group_id)
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", "earliest")
            .set("session.timeout.ms", "30000")
            .set("enable.partition.eof", "false")
            .create()
            .map_err(|e| {
                ServiceError::Queue(format!("failed to create feed-write consumer: {}", e))
            })?;

        consumer
            .subscribe(&[config.writes_topic.as_str()])
            .map_err(|e| ServiceError::Queue(format!("failed to subscribe: {}", e)))?;

        info!(
            topic = %config.writes_topic,
            group = %config.group_id,
            "Feed-write consumer initialized"
        );

        Ok(Self {
            consumer,
            store,
            writer,
            topic: config.writes_topic.clone(),
        })
    }

    pub async fn run(self) -> ServiceResult<()> {
        info!(topic = %self.topic, "Starting feed-write consumer loop");
        let mut backoff = ERROR_BACKOFF;

        loop {
            match self.consumer.recv().await {
                Ok(message) => {
                    backoff = ERROR_BACKOFF;
                    self.handle(&message).await;
                }
                Err(e) => {
                    error!(error = %e, "Feed-write consumer error");
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(MAX_ERROR_BACKOFF);
                }
            }
        }
    }

    async fn handle(&self, message: &BorrowedMessage<'_>) {
        let Some(payload) = message.payload() else {
            warn!("Batch-write message without payload, skipping");
            self.commit(message);
            return;
        };

        let msg: BatchWriteMessage = match serde_json::from_slice(payload) {
            Ok(msg) => msg,
            Err(e) => {
                warn!(error = %e, "Failed to deserialize batch-write message, skipping");
                self.commit(message);
                return;
            }
        };

        let post_id = msg.post.post_id;
        let batch_sequence = msg.batch_sequence_number;
        match apply_batch_write(self.store.as_ref(), &self.writer, &msg).await {
            Ok(outcome) => {
                debug!(
                    post_id = %post_id,
                    batch_sequence,
                    written = outcome.written,
                    dropped = outcome.dropped,
                    "Batch-write job processed"
                );
                self.commit(message);
            }
            Err(ServiceError::Contract(reason)) => {
                error!(
                    post_id = %post_id,
                    batch_sequence,
                    reason = %reason,
                    "Rejecting batch-write job that violates the message contract"
                );
                self.commit(message);
            }
            Err(e) => {
                error!(
                    post_id = %post_id,
                    batch_sequence,
                    error = %e,
                    "Batch write failed, leaving message for redelivery"
                );
            }
        }
    }

    fn commit(&self, message: &BorrowedMessage<'_>) {
        if let Err(e) = self.consumer.commit_message(message, CommitMode::Async) {
            warn!(error = %e, "Failed to commit feed-write offset");
        }
    }
}
