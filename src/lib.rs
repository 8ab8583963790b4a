pub mod cache;
pub mod chunk;
pub mod config;
pub mod consumers;
pub mod error;
pub mod fanout;
pub mod jobs;
pub mod metrics;
pub mod models;
pub mod pagination;
pub mod queue;
pub mod stores;

pub use config::Config;
pub use error::{ServiceError, ServiceResult};

// Re-export the pipeline surface
pub use cache::{FeedCacheStore, RedisFeedCacheStore, FEED_STORE_MAX_BATCH};
pub use fanout::{apply_batch_write, BatchWriter, BatchWriterConfig, FanoutCoordinator, StepOutcome, WriteOutcome};
pub use models::{
    AuthorSnapshot, BatchWriteMessage, CachedFeedEntry, FanOutMessage, FollowEdge, FollowState,
    Post, PostSnapshot, UserProfile,
};
pub use pagination::{Page, PageCursor};
pub use queue::{FanoutQueue, KafkaFanoutQueue};
pub use stores::{FollowDirectory, PostStore, UserDirectory};
