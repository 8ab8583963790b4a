//! Domain models and queue message payloads for the fan-out pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::pagination::PageCursor;

/// Canonical post as held by the post store. Immutable after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub post_id: Uuid,
    pub author_id: Uuid,
    pub contents: String,
    pub created_at: DateTime<Utc>,
}

/// Author display attributes captured at fan-out time and denormalized
/// into every cached feed entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorSnapshot {
    pub display_name: String,
    pub avatar_url: Option<String>,
    pub follower_count: i64,
    pub followee_count: i64,
}

/// Post payload carried through the fan-out queues. The author snapshot is
/// absent on the initial "post published" message and resolved once by the
/// coordinator's start step; batch-write jobs require it to be present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostSnapshot {
    pub post_id: Uuid,
    pub author_id: Uuid,
    pub contents: String,
    pub created_at: DateTime<Utc>,
    pub author: Option<AuthorSnapshot>,
}

impl PostSnapshot {
    pub fn from_post(post: &Post) -> Self {
        PostSnapshot {
            post_id: post.post_id,
            author_id: post.author_id,
            contents: post.contents.clone(),
            created_at: post.created_at,
            author: None,
        }
    }
}

/// Lifecycle of a follow relationship. Unfollowing ends the edge rather
/// than deleting it, preserving audit history; at most one `Active` edge
/// exists per (follower, followee) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum FollowState {
    Active {
        since: DateTime<Utc>,
    },
    Ended {
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    },
}

/// Directed follow edge: `follower_id` follows `followee_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FollowEdge {
    pub follow_id: Uuid,
    pub follower_id: Uuid,
    pub followee_id: Uuid,
    pub state: FollowState,
}

impl FollowEdge {
    pub fn is_active(&self) -> bool {
        matches!(self.state, FollowState::Active { .. })
    }

    pub fn followed_at(&self) -> DateTime<Utc> {
        match self.state {
            FollowState::Active { since } => since,
            FollowState::Ended { since, .. } => since,
        }
    }

    /// Decode a storage row (`unfollowed_at IS NULL` means active).
    pub fn from_row(
        follow_id: Uuid,
        follower_id: Uuid,
        followee_id: Uuid,
        followed_at: DateTime<Utc>,
        unfollowed_at: Option<DateTime<Utc>>,
    ) -> Self {
        let state = match unfollowed_at {
            None => FollowState::Active { since: followed_at },
            Some(until) => FollowState::Ended {
                since: followed_at,
                until,
            },
        };
        FollowEdge {
            follow_id,
            follower_id,
            followee_id,
            state,
        }
    }
}

/// User directory resolution: display attributes plus the cached follower
/// and followee counters the reconciliation job repairs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: Uuid,
    pub display_name: String,
    pub avatar_url: Option<String>,
    pub follower_count: i64,
    pub followee_count: i64,
}

impl From<&UserProfile> for AuthorSnapshot {
    fn from(profile: &UserProfile) -> Self {
        AuthorSnapshot {
            display_name: profile.display_name.clone(),
            avatar_url: profile.avatar_url.clone(),
            follower_count: profile.follower_count,
            followee_count: profile.followee_count,
        }
    }
}

/// Denormalized per-viewer feed entry, keyed by
/// `(viewer_id, created_at, post_id)`. Never updated in place; rewriting
/// the same key is last-write-wins with identical content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedFeedEntry {
    pub viewer_id: Uuid,
    pub post_id: Uuid,
    pub author_id: Uuid,
    pub contents: String,
    pub created_at: DateTime<Utc>,
    pub author_display_name: String,
    pub author_avatar_url: Option<String>,
    pub author_follower_count: i64,
    pub author_followee_count: i64,
}

impl CachedFeedEntry {
    pub fn new(viewer_id: Uuid, post: &PostSnapshot, author: &AuthorSnapshot) -> Self {
        CachedFeedEntry {
            viewer_id,
            post_id: post.post_id,
            author_id: post.author_id,
            contents: post.contents.clone(),
            created_at: post.created_at,
            author_display_name: author.display_name.clone(),
            author_avatar_url: author.avatar_url.clone(),
            author_follower_count: author.follower_count,
            author_followee_count: author.followee_count,
        }
    }
}

/// Fan-out continuation message: which post is being fanned out and where
/// the follower walk left off. All coordination state lives here, never in
/// worker memory, so any worker can resume after a crash.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FanOutMessage {
    pub post: PostSnapshot,
    pub last_follower_position: Option<PageCursor>,
    pub pages_emitted_so_far: u32,
}

impl FanOutMessage {
    /// The initial message for a freshly published post.
    pub fn start(post: PostSnapshot) -> Self {
        FanOutMessage {
            post,
            last_follower_position: None,
            pages_emitted_so_far: 0,
        }
    }
}

/// One page worth of feed-cache writes: the post snapshot (author resolved)
/// and the viewers whose feeds receive it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchWriteMessage {
    pub post: PostSnapshot,
    pub target_viewer_ids: Vec<Uuid>,
    pub batch_sequence_number: u32,
}
