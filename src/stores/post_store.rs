//! Read-only view of the canonical posts table.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::ServiceResult;
use crate::models::Post;
use crate::pagination::{Page, PageCursor};

/// Canonical post access, as narrow as the pipeline needs: the backfill job
/// scans every historical post and refetches individual posts on its retry
/// passes. Posts are immutable and never deleted from this subsystem's
/// perspective.
#[async_trait]
pub trait PostStore: Send + Sync {
    async fn page_of_posts(
        &self,
        cursor: Option<&PageCursor>,
        page_size: usize,
    ) -> ServiceResult<Page<Post>>;

    async fn get(&self, post_id: Uuid) -> ServiceResult<Option<Post>>;
}

type PostRow = (Uuid, Uuid, String, DateTime<Utc>);

fn post_from_row((post_id, author_id, contents, created_at): PostRow) -> Post {
    Post {
        post_id,
        author_id,
        contents,
        created_at,
    }
}

/// PostgreSQL post store over the `posts` table, keyset-paged on
/// `(created_at, id)`.
#[derive(Clone)]
pub struct PgPostStore {
    pool: PgPool,
}

impl PgPostStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PostStore for PgPostStore {
    async fn page_of_posts(
        &self,
        cursor: Option<&PageCursor>,
        page_size: usize,
    ) -> ServiceResult<Page<Post>> {
        let lookahead = (page_size + 1) as i64;

        let rows: Vec<PostRow> = match cursor {
            Some(cursor) => {
                let (after_at, after_id) = cursor.parts()?;
                sqlx::query_as(
                    "SELECT id, author_id, contents, created_at
                     FROM posts
                     WHERE (created_at, id) > ($1, $2)
                     ORDER BY created_at ASC, id ASC
                     LIMIT $3",
                )
                .bind(after_at)
                .bind(after_id)
                .bind(lookahead)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as(
                    "SELECT id, author_id, contents, created_at
                     FROM posts
                     ORDER BY created_at ASC, id ASC
                     LIMIT $1",
                )
                .bind(lookahead)
                .fetch_all(&self.pool)
                .await?
            }
        };

        let posts: Vec<Post> = rows.into_iter().map(post_from_row).collect();
        Ok(Page::from_lookahead(posts, page_size, |post| {
            PageCursor::new(post.created_at, post.post_id)
        }))
    }

    async fn get(&self, post_id: Uuid) -> ServiceResult<Option<Post>> {
        let row: Option<PostRow> = sqlx::query_as(
            "SELECT id, author_id, contents, created_at FROM posts WHERE id = $1",
        )
        .bind(post_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(post_from_row))
    }
}
