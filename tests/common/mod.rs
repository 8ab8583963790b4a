//! In-memory collaborator fakes for pipeline tests.
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Mutex;
use uuid::Uuid;

use feed_fanout::cache::FeedCacheStore;
use feed_fanout::error::{ServiceError, ServiceResult};
use feed_fanout::models::{
    BatchWriteMessage, CachedFeedEntry, FanOutMessage, FollowEdge, FollowState, Post, UserProfile,
};
use feed_fanout::pagination::{Page, PageCursor};
use feed_fanout::queue::FanoutQueue;
use feed_fanout::stores::{FollowDirectory, PostStore, UserDirectory};

pub fn base_time() -> DateTime<Utc> {
    DateTime::from_timestamp_micros(1_700_000_000_000_000).unwrap()
}

/// Deterministic, ordered test ids.
pub fn test_id(n: u32) -> Uuid {
    Uuid::from_u128(0x1000 + n as u128)
}

pub fn profile(user_id: Uuid, name: &str, follower_count: i64, followee_count: i64) -> UserProfile {
    UserProfile {
        user_id,
        display_name: name.to_string(),
        avatar_url: None,
        follower_count,
        followee_count,
    }
}

pub fn post(post_id: Uuid, author_id: Uuid, offset_secs: i64) -> Post {
    Post {
        post_id,
        author_id,
        contents: format!("post {}", post_id),
        created_at: base_time() + ChronoDuration::seconds(offset_secs),
    }
}

// ---------------------------------------------------------------------------
// Follow directory
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct InMemoryFollowDirectory {
    edges: Mutex<Vec<FollowEdge>>,
}

impl InMemoryFollowDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_edge(&self, edge: FollowEdge) {
        self.edges.lock().unwrap().push(edge);
    }

    /// Seed `n` active followers of `followee`, one second apart, with
    /// deterministic ids. Returns the follower ids in follow order.
    pub fn seed_followers(&self, followee: Uuid, n: u32) -> Vec<Uuid> {
        let mut followers = Vec::new();
        for i in 0..n {
            let follower = test_id(10_000 + i);
            self.add_edge(FollowEdge {
                follow_id: test_id(20_000 + i),
                follower_id: follower,
                followee_id: followee,
                state: FollowState::Active {
                    since: base_time() + ChronoDuration::seconds(i as i64),
                },
            });
            followers.push(follower);
        }
        followers
    }

    /// Seed `n` active followers that all share one `followed_at` instant,
    /// leaving only the follow id to break pagination ties.
    pub fn seed_followers_same_instant(&self, followee: Uuid, n: u32) -> Vec<Uuid> {
        let mut followers = Vec::new();
        for i in 0..n {
            let follower = test_id(30_000 + i);
            self.add_edge(FollowEdge {
                follow_id: test_id(40_000 + i),
                follower_id: follower,
                followee_id: followee,
                state: FollowState::Active { since: base_time() },
            });
            followers.push(follower);
        }
        followers
    }

    pub fn unfollow(&self, follower: Uuid, followee: Uuid) {
        let mut edges = self.edges.lock().unwrap();
        for edge in edges.iter_mut() {
            if edge.follower_id == follower && edge.followee_id == followee {
                if let FollowState::Active { since } = edge.state {
                    edge.state = FollowState::Ended {
                        since,
                        until: since + ChronoDuration::seconds(1),
                    };
                }
            }
        }
    }

    fn page_where(
        &self,
        cursor: Option<&PageCursor>,
        page_size: usize,
        select: impl Fn(&FollowEdge) -> bool,
    ) -> ServiceResult<Page<FollowEdge>> {
        let after = match cursor {
            Some(cursor) => Some(cursor.parts()?),
            None => None,
        };

        let mut matching: Vec<FollowEdge> = self
            .edges
            .lock()
            .unwrap()
            .iter()
            .filter(|edge| edge.is_active() && select(edge))
            .cloned()
            .collect();
        matching.sort_by_key(|edge| (edge.followed_at(), edge.follow_id));

        let rows: Vec<FollowEdge> = matching
            .into_iter()
            .filter(|edge| match after {
                Some((at, id)) => (edge.followed_at(), edge.follow_id) > (at, id),
                None => true,
            })
            .take(page_size + 1)
            .collect();

        Ok(Page::from_lookahead(rows, page_size, |edge| {
            PageCursor::new(edge.followed_at(), edge.follow_id)
        }))
    }
}

#[async_trait]
impl FollowDirectory for InMemoryFollowDirectory {
    async fn page_of_followers(
        &self,
        followee_id: Uuid,
        cursor: Option<&PageCursor>,
        page_size: usize,
    ) -> ServiceResult<Page<FollowEdge>> {
        self.page_where(cursor, page_size, |edge| edge.followee_id == followee_id)
    }

    async fn page_of_followees(
        &self,
        follower_id: Uuid,
        cursor: Option<&PageCursor>,
        page_size: usize,
    ) -> ServiceResult<Page<FollowEdge>> {
        self.page_where(cursor, page_size, |edge| edge.follower_id == follower_id)
    }
}

// ---------------------------------------------------------------------------
// User directory
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct InMemoryUserDirectory {
    users: Mutex<BTreeMap<Uuid, UserProfile>>,
    fail_get: Mutex<HashMap<Uuid, u32>>,
    fail_overwrite: Mutex<HashMap<Uuid, u32>>,
}

impl InMemoryUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, profile: UserProfile) {
        self.users.lock().unwrap().insert(profile.user_id, profile);
    }

    /// Fail the next `times` `get` calls for this user.
    pub fn fail_get(&self, user_id: Uuid, times: u32) {
        self.fail_get.lock().unwrap().insert(user_id, times);
    }

    /// Fail the next `times` `overwrite_counts` calls for this user.
    pub fn fail_overwrite(&self, user_id: Uuid, times: u32) {
        self.fail_overwrite.lock().unwrap().insert(user_id, times);
    }

    pub fn counts_of(&self, user_id: Uuid) -> (i64, i64) {
        let users = self.users.lock().unwrap();
        let profile = users.get(&user_id).expect("user not seeded");
        (profile.follower_count, profile.followee_count)
    }

    fn should_fail(plan: &Mutex<HashMap<Uuid, u32>>, user_id: Uuid) -> bool {
        let mut plan = plan.lock().unwrap();
        match plan.get_mut(&user_id) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                true
            }
            _ => false,
        }
    }
}

#[async_trait]
impl UserDirectory for InMemoryUserDirectory {
    async fn get(&self, user_id: Uuid) -> ServiceResult<Option<UserProfile>> {
        if Self::should_fail(&self.fail_get, user_id) {
            return Err(ServiceError::Internal("injected get failure".to_string()));
        }
        Ok(self.users.lock().unwrap().get(&user_id).cloned())
    }

    async fn page_of_users(
        &self,
        cursor: Option<&PageCursor>,
        page_size: usize,
    ) -> ServiceResult<Page<UserProfile>> {
        let after_id = match cursor {
            Some(cursor) => Some(cursor.parts()?.1),
            None => None,
        };

        let rows: Vec<UserProfile> = self
            .users
            .lock()
            .unwrap()
            .values()
            .filter(|profile| match after_id {
                Some(id) => profile.user_id > id,
                None => true,
            })
            .take(page_size + 1)
            .cloned()
            .collect();

        Ok(Page::from_lookahead(rows, page_size, |profile| {
            PageCursor::new(base_time(), profile.user_id)
        }))
    }

    async fn overwrite_counts(
        &self,
        user_id: Uuid,
        follower_count: i64,
        followee_count: i64,
    ) -> ServiceResult<()> {
        if Self::should_fail(&self.fail_overwrite, user_id) {
            return Err(ServiceError::Internal(
                "injected overwrite failure".to_string(),
            ));
        }
        let mut users = self.users.lock().unwrap();
        let profile = users
            .get_mut(&user_id)
            .ok_or_else(|| ServiceError::NotFound(format!("user {}", user_id)))?;
        profile.follower_count = follower_count;
        profile.followee_count = followee_count;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Post store
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct InMemoryPostStore {
    posts: Mutex<Vec<Post>>,
}

impl InMemoryPostStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_post(&self, post: Post) {
        self.posts.lock().unwrap().push(post);
    }
}

#[async_trait]
impl PostStore for InMemoryPostStore {
    async fn page_of_posts(
        &self,
        cursor: Option<&PageCursor>,
        page_size: usize,
    ) -> ServiceResult<Page<Post>> {
        let after = match cursor {
            Some(cursor) => Some(cursor.parts()?),
            None => None,
        };

        let mut posts: Vec<Post> = self.posts.lock().unwrap().clone();
        posts.sort_by_key(|post| (post.created_at, post.post_id));

        let rows: Vec<Post> = posts
            .into_iter()
            .filter(|post| match after {
                Some((at, id)) => (post.created_at, post.post_id) > (at, id),
                None => true,
            })
            .take(page_size + 1)
            .collect();

        Ok(Page::from_lookahead(rows, page_size, |post| {
            PageCursor::new(post.created_at, post.post_id)
        }))
    }

    async fn get(&self, post_id: Uuid) -> ServiceResult<Option<Post>> {
        Ok(self
            .posts
            .lock()
            .unwrap()
            .iter()
            .find(|post| post.post_id == post_id)
            .cloned())
    }
}

// ---------------------------------------------------------------------------
// Feed cache store
// ---------------------------------------------------------------------------

pub struct InMemoryFeedCacheStore {
    max_batch: usize,
    feeds: Mutex<HashMap<Uuid, BTreeMap<(i64, Uuid), CachedFeedEntry>>>,
    throttle_plan: Mutex<VecDeque<usize>>,
    call_sizes: Mutex<Vec<usize>>,
}

impl InMemoryFeedCacheStore {
    pub fn new(max_batch: usize) -> Self {
        Self {
            max_batch,
            feeds: Mutex::new(HashMap::new()),
            throttle_plan: Mutex::new(VecDeque::new()),
            call_sizes: Mutex::new(Vec::new()),
        }
    }

    /// Script how many entries each upcoming `batch_put` call rejects as
    /// unprocessed; calls beyond the plan accept everything.
    pub fn set_throttle_plan(&self, plan: Vec<usize>) {
        *self.throttle_plan.lock().unwrap() = plan.into();
    }

    pub fn call_sizes(&self) -> Vec<usize> {
        self.call_sizes.lock().unwrap().clone()
    }

    /// Entries in one viewer's feed, newest first.
    pub fn entries_for(&self, viewer_id: Uuid) -> Vec<CachedFeedEntry> {
        self.feeds
            .lock()
            .unwrap()
            .get(&viewer_id)
            .map(|feed| feed.values().rev().cloned().collect())
            .unwrap_or_default()
    }

    pub fn total_entries(&self) -> usize {
        self.feeds
            .lock()
            .unwrap()
            .values()
            .map(|feed| feed.len())
            .sum()
    }
}

#[async_trait]
impl FeedCacheStore for InMemoryFeedCacheStore {
    fn max_batch_size(&self) -> usize {
        self.max_batch
    }

    async fn batch_put(&self, entries: &[CachedFeedEntry]) -> ServiceResult<Vec<CachedFeedEntry>> {
        self.call_sizes.lock().unwrap().push(entries.len());
        if entries.len() > self.max_batch {
            return Err(ServiceError::InvalidInput(format!(
                "batch of {} entries exceeds store limit {}",
                entries.len(),
                self.max_batch
            )));
        }

        let rejected = self
            .throttle_plan
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(0)
            .min(entries.len());

        let mut feeds = self.feeds.lock().unwrap();
        for entry in &entries[rejected..] {
            feeds
                .entry(entry.viewer_id)
                .or_default()
                .insert((entry.created_at.timestamp_micros(), entry.post_id), entry.clone());
        }

        Ok(entries[..rejected].to_vec())
    }

    async fn page(
        &self,
        viewer_id: Uuid,
        cursor: Option<&PageCursor>,
        page_size: usize,
    ) -> ServiceResult<Page<CachedFeedEntry>> {
        let before = match cursor {
            Some(cursor) => {
                let (at, id) = cursor.parts()?;
                Some((at.timestamp_micros(), id))
            }
            None => None,
        };

        let rows: Vec<CachedFeedEntry> = self
            .feeds
            .lock()
            .unwrap()
            .get(&viewer_id)
            .map(|feed| {
                feed.iter()
                    .rev()
                    .filter(|((at, id), _)| match before {
                        Some((before_at, before_id)) => (*at, *id) < (before_at, before_id),
                        None => true,
                    })
                    .take(page_size + 1)
                    .map(|(_, entry)| entry.clone())
                    .collect()
            })
            .unwrap_or_default();

        Ok(Page::from_lookahead(rows, page_size, |entry| {
            PageCursor::new(entry.created_at, entry.post_id)
        }))
    }
}

// ---------------------------------------------------------------------------
// Queue
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct InMemoryFanoutQueue {
    fan_out: Mutex<VecDeque<FanOutMessage>>,
    writes: Mutex<VecDeque<BatchWriteMessage>>,
}

impl InMemoryFanoutQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_fan_out(&self, msg: FanOutMessage) {
        self.fan_out.lock().unwrap().push_back(msg);
    }

    pub fn pop_fan_out(&self) -> Option<FanOutMessage> {
        self.fan_out.lock().unwrap().pop_front()
    }

    pub fn drain_writes(&self) -> Vec<BatchWriteMessage> {
        self.writes.lock().unwrap().drain(..).collect()
    }

    pub fn fan_out_len(&self) -> usize {
        self.fan_out.lock().unwrap().len()
    }

    pub fn writes_len(&self) -> usize {
        self.writes.lock().unwrap().len()
    }
}

#[async_trait]
impl FanoutQueue for InMemoryFanoutQueue {
    async fn enqueue_fan_out(&self, msg: &FanOutMessage) -> ServiceResult<()> {
        self.fan_out.lock().unwrap().push_back(msg.clone());
        Ok(())
    }

    async fn enqueue_batch_write(&self, msg: &BatchWriteMessage) -> ServiceResult<()> {
        self.writes.lock().unwrap().push_back(msg.clone());
        Ok(())
    }
}
