//! One-time feed cache backfill runner.
//!
//! Seeds the cached feeds for all historical posts through the same batch
//! writer path as live fan-out. Safe to re-run: write keys are
//! deterministic, so completed posts are simply overwritten in place.

use anyhow::{Context, Result};
use redis::aio::ConnectionManager;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use feed_fanout::cache::{FeedCacheStore, RedisFeedCacheStore};
use feed_fanout::fanout::{BatchWriter, BatchWriterConfig};
use feed_fanout::jobs::{BackfillConfig, FeedBackfill};
use feed_fanout::stores::{
    FollowDirectory, PgFollowDirectory, PgPostStore, PgUserDirectory, PostStore, UserDirectory,
};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "backfill_feeds=info,feed_fanout=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting feed cache backfill run");

    let database_url =
        std::env::var("DATABASE_URL").context("DATABASE_URL environment variable not set")?;
    let redis_url = std::env::var("REDIS_URL").context("REDIS_URL environment variable not set")?;

    let pg_pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("Failed to connect to PostgreSQL")?;

    let redis_client =
        redis::Client::open(redis_url.as_str()).context("Failed to create Redis client")?;
    let redis_conn = ConnectionManager::new(redis_client)
        .await
        .context("Failed to connect to Redis")?;

    let posts: Arc<dyn PostStore> = Arc::new(PgPostStore::new(pg_pool.clone()));
    let users: Arc<dyn UserDirectory> = Arc::new(PgUserDirectory::new(pg_pool.clone()));
    let follows: Arc<dyn FollowDirectory> = Arc::new(PgFollowDirectory::new(pg_pool));
    let store: Arc<dyn FeedCacheStore> =
        Arc::new(RedisFeedCacheStore::new(Arc::new(redis_conn)));
    let writer = BatchWriter::new(BatchWriterConfig::default());

    let job = FeedBackfill::new(posts, users, follows, store, writer, BackfillConfig::default());
    let stats = job.run().await.context("Backfill run failed")?;

    info!(
        posts_processed = stats.posts_processed,
        entries_written = stats.entries_written,
        entries_dropped = stats.entries_dropped,
        "Backfill summary"
    );
    if !stats.failed_post_ids.is_empty() {
        warn!(
            failed_posts = ?stats.failed_post_ids,
            "Some posts could not be backfilled, manual follow-up required"
        );
    }

    Ok(())
}
