//! One-time feed cache backfill.
//!
//! Scans every historical post and pushes it through the same batch-write
//! path as live fan-out. Deliveries go to each author's *current* active
//! followers, not the followers active when the post was created; that
//! approximation is inherited from the original rollout and is intentional
//! documented behavior. Re-running is safe because write keys are
//! deterministic.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::cache::FeedCacheStore;
use crate::error::{ServiceError, ServiceResult};
use crate::fanout::BatchWriter;
use crate::metrics;
use crate::models::{AuthorSnapshot, CachedFeedEntry, Post, PostSnapshot};
use crate::pagination::PageCursor;
use crate::stores::{FollowDirectory, PostStore, UserDirectory};

#[derive(Debug, Clone)]
pub struct BackfillConfig {
    pub post_page_size: usize,
    pub follower_page_size: usize,
    /// Pause between posts, to respect store throughput limits
    pub inter_post_delay: Duration,
    /// Additional passes over posts that failed
    pub retry_passes: u32,
    /// Base delay before a retry pass; grows with the pass number
    pub retry_backoff: Duration,
}

impl Default for BackfillConfig {
    fn default() -> Self {
        Self {
            post_page_size: 100,
            follower_page_size: 100,
            inter_post_delay: Duration::from_millis(50),
            retry_passes: 3,
            retry_backoff: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Default)]
pub struct BackfillStats {
    pub posts_processed: u64,
    pub entries_written: u64,
    pub entries_dropped: u64,
    /// Posts still failing after every retry pass.
    pub failed_post_ids: Vec<Uuid>,
}

pub struct FeedBackfill {
    posts: Arc<dyn PostStore>,
    users: Arc<dyn UserDirectory>,
    follows: Arc<dyn FollowDirectory>,
    store: Arc<dyn FeedCacheStore>,
    writer: BatchWriter,
    config: BackfillConfig,
}

impl FeedBackfill {
    pub fn new(
        posts: Arc<dyn PostStore>,
        users: Arc<dyn UserDirectory>,
        follows: Arc<dyn FollowDirectory>,
        store: Arc<dyn FeedCacheStore>,
        writer: BatchWriter,
        config: BackfillConfig,
    ) -> Self {
        Self {
            posts,
            users,
            follows,
            store,
            writer,
            config,
        }
    }

    pub async fn run(&self) -> ServiceResult<BackfillStats> {
        let result = self.scan().await;
        match &result {
            Ok(stats) if stats.failed_post_ids.is_empty() => {
                metrics::record_job_run("backfill", "success")
            }
            Ok(_) => metrics::record_job_run("backfill", "partial"),
            Err(_) => metrics::record_job_run("backfill", "error"),
        }
        result
    }

    async fn scan(&self) -> ServiceResult<BackfillStats> {
        info!(
            post_page_size = self.config.post_page_size,
            follower_page_size = self.config.follower_page_size,
            "Starting feed cache backfill"
        );

        let mut stats = BackfillStats::default();
        let mut failed: Vec<Uuid> = Vec::new();
        let mut cursor: Option<PageCursor> = None;

        loop {
            let page = self
                .posts
                .page_of_posts(cursor.as_ref(), self.config.post_page_size)
                .await?;

            for post in &page.items {
                stats.posts_processed += 1;
                match self.backfill_post(post).await {
                    Ok((written, dropped)) => {
                        stats.entries_written += written;
                        stats.entries_dropped += dropped;
                    }
                    Err(e) => {
                        warn!(
                            post_id = %post.post_id,
                            error = %e,
                            "Failed to backfill post, continuing with the rest"
                        );
                        failed.push(post.post_id);
                    }
                }

                if !self.config.inter_post_delay.is_zero() {
                    sleep(self.config.inter_post_delay).await;
                }
            }

            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        for pass in 1..=self.config.retry_passes {
            if failed.is_empty() {
                break;
            }
            let delay = self.config.retry_backoff * pass;
            info!(
                pass,
                remaining = failed.len(),
                delay_ms = delay.as_millis() as u64,
                "Retrying failed posts"
            );
            if !delay.is_zero() {
                sleep(delay).await;
            }

            let mut still_failing = Vec::new();
            for post_id in failed.drain(..) {
                match self.posts.get(post_id).await {
                    Ok(Some(post)) => match self.backfill_post(&post).await {
                        Ok((written, dropped)) => {
                            stats.entries_written += written;
                            stats.entries_dropped += dropped;
                        }
                        Err(e) => {
                            warn!(post_id = %post_id, pass, error = %e, "Retry failed");
                            still_failing.push(post_id);
                        }
                    },
                    Ok(None) => {
                        debug!(post_id = %post_id, "Post no longer in store, skipping");
                    }
                    Err(e) => {
                        warn!(post_id = %post_id, pass, error = %e, "Retry lookup failed");
                        still_failing.push(post_id);
                    }
                }
            }
            failed = still_failing;
        }

        if !failed.is_empty() {
            warn!(
                failed_posts = ?failed,
                "Posts still failing after all retry passes, manual follow-up required"
            );
        }
        stats.failed_post_ids = failed;

        info!(
            posts_processed = stats.posts_processed,
            entries_written = stats.entries_written,
            entries_dropped = stats.entries_dropped,
            failed = stats.failed_post_ids.len(),
            "Feed cache backfill finished"
        );
        Ok(stats)
    }

    /// Deliver one post to all of its author's current active followers.
    async fn backfill_post(&self, post: &Post) -> ServiceResult<(u64, u64)> {
        let profile = self.users.get(post.author_id).await?.ok_or_else(|| {
            ServiceError::NotFound(format!(
                "author {} of post {} not found",
                post.author_id, post.post_id
            ))
        })?;
        let author = AuthorSnapshot::from(&profile);
        let mut snapshot = PostSnapshot::from_post(post);
        snapshot.author = Some(author.clone());

        let mut written = 0u64;
        let mut dropped = 0u64;
        let mut cursor: Option<PageCursor> = None;

        loop {
            let page = self
                .follows
                .page_of_followers(post.author_id, cursor.as_ref(), self.config.follower_page_size)
                .await?;

            if !page.items.is_empty() {
                let entries: Vec<CachedFeedEntry> = page
                    .items
                    .iter()
                    .map(|edge| CachedFeedEntry::new(edge.follower_id, &snapshot, &author))
                    .collect();
                let outcome = self.writer.write(self.store.as_ref(), &entries).await?;
                written += outcome.written as u64;
                dropped += outcome.dropped as u64;
            }

            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        debug!(
            post_id = %post.post_id,
            written,
            dropped,
            "Backfilled post into follower feeds"
        );
        Ok((written, dropped))
    }
}
