pub mod kafka;

use async_trait::async_trait;

use crate::error::ServiceResult;
use crate::models::{BatchWriteMessage, FanOutMessage};

pub use kafka::KafkaFanoutQueue;

/// Default topic names; overridable through configuration.
pub mod topics {
    pub const FAN_OUT: &str = "feed.fanout";
    pub const FEED_WRITES: &str = "feed.fanout.writes";
}

/// Producer side of the two fan-out queues.
///
/// Both queues are at-least-once: a message may be delivered to a worker
/// more than once, so every handler downstream is idempotent. Enqueue
/// failures are surfaced to the caller because skipping a continuation
/// would silently truncate a fan-out.
#[async_trait]
pub trait FanoutQueue: Send + Sync {
    async fn enqueue_fan_out(&self, msg: &FanOutMessage) -> ServiceResult<()>;

    async fn enqueue_batch_write(&self, msg: &BatchWriteMessage) -> ServiceResult<()>;
}
