pub mod feed_store;

pub use feed_store::{FeedCacheStore, RedisFeedCacheStore, FEED_STORE_MAX_BATCH};
