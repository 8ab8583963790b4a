//! Kafka producer for the fan-out queues.

use async_trait::async_trait;
use rdkafka::producer::{FutureProducer, FutureRecord};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::KafkaConfig;
use crate::error::{ServiceError, ServiceResult};
use crate::models::{BatchWriteMessage, FanOutMessage};
use crate::queue::FanoutQueue;

const SEND_TIMEOUT: Duration = Duration::from_secs(5);

/// Kafka-backed fan-out queue producer. Messages are keyed by post id so
/// all pages of one post land on one partition.
#[derive(Clone)]
pub struct KafkaFanoutQueue {
    producer: FutureProducer,
    fan_out_topic: String,
    writes_topic: String,
}

impl KafkaFanoutQueue {
    pub fn new(config: &KafkaConfig) -> ServiceResult<Self> {
        let producer = rdkafka::config::ClientConfig::new()
            .set("bootstrap.servers", &config.brokers)
            .set("client.id", "feed-fanout-service")
            .set("enable.idempotence", "true")
            .set("acks", "all")
            .set("max.in.flight.requests.per.connection", "5")
            .set("retries", "3")
            .set("linger.ms", "5")
            .create::<FutureProducer>()
            .map_err(|e| ServiceError::Queue(format!("failed to create Kafka producer: {}", e)))?;

        info!(
            brokers = %config.brokers,
            fan_out_topic = %config.fan_out_topic,
            writes_topic = %config.writes_topic,
            "Fan-out Kafka producer initialized"
        );

        Ok(Self {
            producer,
            fan_out_topic: config.fan_out_topic.clone(),
            writes_topic: config.writes_topic.clone(),
        })
    }

    async fn publish(&self, topic: &str, key: &str, payload: &str) -> ServiceResult<()> {
        let record = FutureRecord::to(topic).key(key).payload(payload);

        match self.producer.send(record, SEND_TIMEOUT).await {
            Ok(_) => {
                debug!(topic = %topic, key = %key, "Published fan-out message");
                Ok(())
            }
            Err((err, _)) => {
                warn!(topic = %topic, key = %key, error = ?err, "Failed to publish fan-out message");
                Err(ServiceError::Queue(format!(
                    "failed to publish to {}: {}",
                    topic, err
                )))
            }
        }
    }
}

#[async_trait]
impl FanoutQueue for KafkaFanoutQueue {
    async fn enqueue_fan_out(&self, msg: &FanOutMessage) -> ServiceResult<()> {
        let payload = serde_json::to_string(msg)?;
        self.publish(&self.fan_out_topic, &msg.post.post_id.to_string(), &payload)
            .await
    }

    async fn enqueue_batch_write(&self, msg: &BatchWriteMessage) -> ServiceResult<()> {
        let payload = serde_json::to_string(msg)?;
        self.publish(&self.writes_topic, &msg.post.post_id.to_string(), &payload)
            .await
    }
}
