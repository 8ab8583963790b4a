//! Redis-backed per-viewer materialized feed.
//!
//! Layout per viewer:
//! - `feed:{viewer_id}`: hash mapping member key to entry JSON
//! - `feed:idx:{viewer_id}`: sorted set of member keys, all at score 0,
//!   paged lexicographically
//!
//! A member key is `{created_at_micros:020}:{post_id}`, so lexicographic
//! order equals `(created_at, post_id)` order and `HSET`/`ZADD` give
//! last-write-wins without duplicates. The feed cache is a read
//! optimization, not the system of record; a lost entry is repairable by
//! backfill and invisible to count reconciliation.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{ServiceError, ServiceResult};
use crate::models::CachedFeedEntry;
use crate::pagination::{Page, PageCursor};

/// Hard per-call item limit of the batch write path.
pub const FEED_STORE_MAX_BATCH: usize = 25;

/// Write and read path of the cached feed.
///
/// `batch_put` mirrors a throttling key-value store: it may return a subset
/// of the call's entries as unprocessed, which the batch writer retries
/// with backoff and eventually drops as an accepted partial failure.
#[async_trait]
pub trait FeedCacheStore: Send + Sync {
    fn max_batch_size(&self) -> usize;

    /// Write up to `max_batch_size` entries; returns the entries the store
    /// could not accept this call. Calls above the limit are an error.
    async fn batch_put(&self, entries: &[CachedFeedEntry]) -> ServiceResult<Vec<CachedFeedEntry>>;

    /// Newest-first page of one viewer's feed.
    async fn page(
        &self,
        viewer_id: Uuid,
        cursor: Option<&PageCursor>,
        page_size: usize,
    ) -> ServiceResult<Page<CachedFeedEntry>>;
}

fn member_key(created_at_micros: i64, post_id: Uuid) -> String {
    format!("{:020}:{}", created_at_micros.max(0), post_id)
}

fn entry_member_key(entry: &CachedFeedEntry) -> String {
    member_key(entry.created_at.timestamp_micros(), entry.post_id)
}

/// Redis feed cache store. The connection manager is constructed once at
/// startup and shared by every caller.
#[derive(Clone)]
pub struct RedisFeedCacheStore {
    client: Arc<ConnectionManager>,
    max_batch: usize,
}

impl RedisFeedCacheStore {
    pub fn new(client: Arc<ConnectionManager>) -> Self {
        Self {
            client,
            max_batch: FEED_STORE_MAX_BATCH,
        }
    }

    fn feed_key(viewer_id: Uuid) -> String {
        format!("feed:{}", viewer_id)
    }

    fn index_key(viewer_id: Uuid) -> String {
        format!("feed:idx:{}", viewer_id)
    }
}

#[async_trait]
impl FeedCacheStore for RedisFeedCacheStore {
    fn max_batch_size(&self) -> usize {
        self.max_batch
    }

    async fn batch_put(&self, entries: &[CachedFeedEntry]) -> ServiceResult<Vec<CachedFeedEntry>> {
        if entries.is_empty() {
            return Ok(Vec::new());
        }
        if entries.len() > self.max_batch {
            return Err(ServiceError::InvalidInput(format!(
                "batch of {} entries exceeds store limit {}",
                entries.len(),
                self.max_batch
            )));
        }

        let mut pipe = redis::pipe();
        for entry in entries {
            let member = entry_member_key(entry);
            let json = serde_json::to_string(entry)?;
            pipe.cmd("HSET")
                .arg(Self::feed_key(entry.viewer_id))
                .arg(&member)
                .arg(json)
                .ignore();
            pipe.cmd("ZADD")
                .arg(Self::index_key(entry.viewer_id))
                .arg(0)
                .arg(&member)
                .ignore();
        }

        match pipe
            .query_async::<_, ()>(&mut self.client.as_ref().clone())
            .await
        {
            Ok(()) => Ok(Vec::new()),
            Err(e) => {
                // Transport/capacity trouble: report the whole call as
                // unprocessed so the batch writer's retry policy applies.
                warn!(
                    entries = entries.len(),
                    error = %e,
                    "Redis batch write failed, returning entries as unprocessed"
                );
                Ok(entries.to_vec())
            }
        }
    }

    async fn page(
        &self,
        viewer_id: Uuid,
        cursor: Option<&PageCursor>,
        page_size: usize,
    ) -> ServiceResult<Page<CachedFeedEntry>> {
        let max_bound = match cursor {
            Some(cursor) => {
                let (created_at, post_id) = cursor.parts()?;
                format!("({}", member_key(created_at.timestamp_micros(), post_id))
            }
            None => "+".to_string(),
        };

        let mut members: Vec<String> = redis::cmd("ZREVRANGEBYLEX")
            .arg(Self::index_key(viewer_id))
            .arg(&max_bound)
            .arg("-")
            .arg("LIMIT")
            .arg(0)
            .arg((page_size + 1) as i64)
            .query_async(&mut self.client.as_ref().clone())
            .await
            .map_err(|e| {
                warn!(viewer_id = %viewer_id, error = %e, "Redis feed index read failed");
                ServiceError::from(e)
            })?;

        if members.is_empty() {
            return Ok(Page::empty());
        }

        let has_more = members.len() > page_size;
        members.truncate(page_size);

        let payloads: Vec<Option<String>> = redis::cmd("HMGET")
            .arg(Self::feed_key(viewer_id))
            .arg(&members)
            .query_async(&mut self.client.as_ref().clone())
            .await
            .map_err(|e| {
                warn!(viewer_id = %viewer_id, error = %e, "Redis feed payload read failed");
                ServiceError::from(e)
            })?;

        let mut entries = Vec::with_capacity(members.len());
        for (member, payload) in members.iter().zip(payloads) {
            match payload {
                Some(json) => entries.push(serde_json::from_str::<CachedFeedEntry>(&json)?),
                None => {
                    warn!(
                        viewer_id = %viewer_id,
                        member = %member,
                        "Feed index member has no payload, skipping"
                    );
                }
            }
        }

        let next_cursor = if has_more {
            entries
                .last()
                .map(|entry| PageCursor::new(entry.created_at, entry.post_id))
        } else {
            None
        };

        debug!(
            viewer_id = %viewer_id,
            entries = entries.len(),
            has_more,
            "Read cached feed page"
        );

        Ok(Page {
            items: entries,
            next_cursor,
        })
    }
}
