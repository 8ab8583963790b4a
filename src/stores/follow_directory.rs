//! Read-only view of the follow graph's source-of-truth table.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::ServiceResult;
use crate::models::FollowEdge;
use crate::pagination::{Page, PageCursor};

/// Page size used when counting edges by walking pages.
const COUNT_PAGE_SIZE: usize = 500;

/// Paged access to active follow edges.
///
/// The fan-out pipeline only reads the follow graph; follow/unfollow writes
/// belong to the social service that owns the table. The count methods page
/// internally and are O(edges), not O(1); they exist to recompute the truth
/// the cached per-user counters are reconciled against.
#[async_trait]
pub trait FollowDirectory: Send + Sync {
    /// One page of active followers of `followee_id`, ordered by
    /// `(followed_at, follow_id)`.
    async fn page_of_followers(
        &self,
        followee_id: Uuid,
        cursor: Option<&PageCursor>,
        page_size: usize,
    ) -> ServiceResult<Page<FollowEdge>>;

    /// One page of active followees of `follower_id`, same ordering.
    async fn page_of_followees(
        &self,
        follower_id: Uuid,
        cursor: Option<&PageCursor>,
        page_size: usize,
    ) -> ServiceResult<Page<FollowEdge>>;

    async fn active_follower_count(&self, user_id: Uuid) -> ServiceResult<u64> {
        let mut count = 0u64;
        let mut cursor: Option<PageCursor> = None;
        loop {
            let page = self
                .page_of_followers(user_id, cursor.as_ref(), COUNT_PAGE_SIZE)
                .await?;
            count += page.items.len() as u64;
            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => return Ok(count),
            }
        }
    }

    async fn active_followee_count(&self, user_id: Uuid) -> ServiceResult<u64> {
        let mut count = 0u64;
        let mut cursor: Option<PageCursor> = None;
        loop {
            let page = self
                .page_of_followees(user_id, cursor.as_ref(), COUNT_PAGE_SIZE)
                .await?;
            count += page.items.len() as u64;
            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => return Ok(count),
            }
        }
    }
}

type FollowRow = (Uuid, Uuid, Uuid, DateTime<Utc>, Option<DateTime<Utc>>);

/// PostgreSQL follow directory over the `follows` table.
///
/// Keyset pagination on `(followed_at, id)` so pages stay stable under
/// concurrent inserts with identical timestamps. Fetches one row beyond the
/// page size; a full final page therefore reports no next cursor.
#[derive(Clone)]
pub struct PgFollowDirectory {
    pool: PgPool,
}

impl PgFollowDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn page_of_edges(
        &self,
        filter_column: &str,
        user_id: Uuid,
        cursor: Option<&PageCursor>,
        page_size: usize,
    ) -> ServiceResult<Page<FollowEdge>> {
        let lookahead = (page_size + 1) as i64;

        let rows: Vec<FollowRow> = match cursor {
            Some(cursor) => {
                let (after_at, after_id) = cursor.parts()?;
                sqlx::query_as(&format!(
                    "SELECT id, follower_id, followee_id, followed_at, unfollowed_at
                     FROM follows
                     WHERE {filter_column} = $1
                       AND unfollowed_at IS NULL
                       AND (followed_at, id) > ($2, $3)
                     ORDER BY followed_at ASC, id ASC
                     LIMIT $4"
                ))
                .bind(user_id)
                .bind(after_at)
                .bind(after_id)
                .bind(lookahead)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as(&format!(
                    "SELECT id, follower_id, followee_id, followed_at, unfollowed_at
                     FROM follows
                     WHERE {filter_column} = $1
                       AND unfollowed_at IS NULL
                     ORDER BY followed_at ASC, id ASC
                     LIMIT $2"
                ))
                .bind(user_id)
                .bind(lookahead)
                .fetch_all(&self.pool)
                .await?
            }
        };

        let edges: Vec<FollowEdge> = rows
            .into_iter()
            .map(|(id, follower_id, followee_id, followed_at, unfollowed_at)| {
                FollowEdge::from_row(id, follower_id, followee_id, followed_at, unfollowed_at)
            })
            .collect();

        Ok(Page::from_lookahead(edges, page_size, |edge| {
            PageCursor::new(edge.followed_at(), edge.follow_id)
        }))
    }
}

#[async_trait]
impl FollowDirectory for PgFollowDirectory {
    async fn page_of_followers(
        &self,
        followee_id: Uuid,
        cursor: Option<&PageCursor>,
        page_size: usize,
    ) -> ServiceResult<Page<FollowEdge>> {
        self.page_of_edges("followee_id", followee_id, cursor, page_size)
            .await
    }

    async fn page_of_followees(
        &self,
        follower_id: Uuid,
        cursor: Option<&PageCursor>,
        page_size: usize,
    ) -> ServiceResult<Page<FollowEdge>> {
        self.page_of_edges("follower_id", follower_id, cursor, page_size)
            .await
    }
}
