//! User directory: display attributes plus the cached edge counters.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::debug;
use uuid::Uuid;

use crate::error::ServiceResult;
use crate::models::UserProfile;
use crate::pagination::{Page, PageCursor};

/// Resolves user ids to the display attributes denormalized into feed
/// entries, and exposes the one write the pipeline owns: overwriting a
/// user's cached follower/followee counters when reconciliation finds
/// drift (last-computed-wins).
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn get(&self, user_id: Uuid) -> ServiceResult<Option<UserProfile>>;

    /// Paged scan of all users, for the reconciliation sweep.
    async fn page_of_users(
        &self,
        cursor: Option<&PageCursor>,
        page_size: usize,
    ) -> ServiceResult<Page<UserProfile>>;

    async fn overwrite_counts(
        &self,
        user_id: Uuid,
        follower_count: i64,
        followee_count: i64,
    ) -> ServiceResult<()>;
}

type UserRow = (Uuid, String, Option<String>, i64, i64, DateTime<Utc>);

/// PostgreSQL user directory over the `users` table. Soft-deleted users
/// (`deleted_at IS NOT NULL`) are invisible.
#[derive(Clone)]
pub struct PgUserDirectory {
    pool: PgPool,
}

impl PgUserDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserDirectory for PgUserDirectory {
    async fn get(&self, user_id: Uuid) -> ServiceResult<Option<UserProfile>> {
        let row: Option<UserRow> = sqlx::query_as(
            "SELECT id, display_name, avatar_url, follower_count, followee_count, created_at
             FROM users
             WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(
            |(user_id, display_name, avatar_url, follower_count, followee_count, _)| UserProfile {
                user_id,
                display_name,
                avatar_url,
                follower_count,
                followee_count,
            },
        ))
    }

    async fn page_of_users(
        &self,
        cursor: Option<&PageCursor>,
        page_size: usize,
    ) -> ServiceResult<Page<UserProfile>> {
        let lookahead = (page_size + 1) as i64;

        let rows: Vec<UserRow> = match cursor {
            Some(cursor) => {
                let (after_at, after_id) = cursor.parts()?;
                sqlx::query_as(
                    "SELECT id, display_name, avatar_url, follower_count, followee_count, created_at
                     FROM users
                     WHERE deleted_at IS NULL AND (created_at, id) > ($1, $2)
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
                    "SELECT id, display_name, avatar_url, follower_count, followee_count, created_at
                     FROM users
                     WHERE deleted_at IS NULL
                     ORDER BY created_at ASC, id ASC
                     LIMIT $1",
                )
                .bind(lookahead)
                .fetch_all(&self.pool)
                .await?
            }
        };

        let keyed: Vec<(UserProfile, DateTime<Utc>)> = rows
            .into_iter()
            .map(
                |(user_id, display_name, avatar_url, follower_count, followee_count, created_at)| {
                    (
                        UserProfile {
                            user_id,
                            display_name,
                            avatar_url,
                            follower_count,
                            followee_count,
                        },
                        created_at,
                    )
                },
            )
            .collect();

        let page = Page::from_lookahead(keyed, page_size, |(profile, created_at)| {
            PageCursor::new(*created_at, profile.user_id)
        });

        Ok(Page {
            items: page.items.into_iter().map(|(profile, _)| profile).collect(),
            next_cursor: page.next_cursor,
        })
    }

    async fn overwrite_counts(
        &self,
        user_id: Uuid,
        follower_count: i64,
        followee_count: i64,
    ) -> ServiceResult<()> {
        sqlx::query(
            "UPDATE users
             SET follower_count = $2, followee_count = $3, updated_at = NOW()
             WHERE id = $1",
        )
        .bind(user_id)
        .bind(follower_count)
        .bind(followee_count)
        .execute(&self.pool)
        .await?;

        debug!(
            user_id = %user_id,
            follower_count,
            followee_count,
            "Overwrote cached edge counters"
        );
        Ok(())
    }
}
