//! Fan-out of a published post across its author's follower list.
//!
//! The coordinator is a trampoline over the fan-out queue: each delivered
//! `FanOutMessage` drives exactly one follower page, and remaining work is
//! re-enqueued as a continuation message instead of looping in-process.
//! That bounds per-invocation work, lets the transport's concurrency pace
//! the fan-out, and makes every step independently resumable after a crash
//! under at-least-once redelivery.

use std::sync::Arc;
use tracing::{debug, info};

use crate::error::{ServiceError, ServiceResult};
use crate::metrics;
use crate::models::{AuthorSnapshot, BatchWriteMessage, FanOutMessage};
use crate::queue::FanoutQueue;
use crate::stores::{FollowDirectory, UserDirectory};

/// Result of one coordinator step, for logging and tests. Side effects
/// (batch-write jobs, continuations) go through the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// No continuation was enqueued; this post's fan-out is done.
    Completed { pages_emitted: u32 },
    /// A continuation message was enqueued for the next page.
    Continued { pages_emitted: u32 },
}

pub struct FanoutCoordinator {
    follows: Arc<dyn FollowDirectory>,
    users: Arc<dyn UserDirectory>,
    queue: Arc<dyn FanoutQueue>,
    page_size: usize,
}

impl FanoutCoordinator {
    pub fn new(
        follows: Arc<dyn FollowDirectory>,
        users: Arc<dyn UserDirectory>,
        queue: Arc<dyn FanoutQueue>,
        page_size: usize,
    ) -> Self {
        Self {
            follows,
            users,
            queue,
            page_size,
        }
    }

    /// Process one fan-out message: resolve the author snapshot on the
    /// start step, emit one batch-write job for this follower page, and
    /// re-enqueue a continuation when more pages remain.
    ///
    /// Errors propagate to the caller so the transport redelivers the whole
    /// step; the cursor never advances past a failed page fetch, and a
    /// failed enqueue retries rather than silently truncating the fan-out.
    pub async fn step(&self, msg: FanOutMessage) -> ServiceResult<StepOutcome> {
        let mut msg = msg;

        if msg.post.author.is_none() {
            let profile = self.users.get(msg.post.author_id).await?.ok_or_else(|| {
                ServiceError::Contract(format!(
                    "author {} of post {} not found in user directory",
                    msg.post.author_id, msg.post.post_id
                ))
            })?;
            msg.post.author = Some(AuthorSnapshot::from(&profile));
            debug!(
                post_id = %msg.post.post_id,
                author_id = %msg.post.author_id,
                "Resolved author snapshot for fan-out"
            );
        }

        let page = self
            .follows
            .page_of_followers(
                msg.post.author_id,
                msg.last_follower_position.as_ref(),
                self.page_size,
            )
            .await?;

        if page.items.is_empty() {
            info!(
                post_id = %msg.post.post_id,
                pages_emitted = msg.pages_emitted_so_far,
                "Fan-out complete, no followers to deliver to"
            );
            return Ok(StepOutcome::Completed {
                pages_emitted: msg.pages_emitted_so_far,
            });
        }

        let batch = BatchWriteMessage {
            post: msg.post.clone(),
            target_viewer_ids: page.items.iter().map(|edge| edge.follower_id).collect(),
            batch_sequence_number: msg.pages_emitted_so_far,
        };
        self.queue.enqueue_batch_write(&batch).await?;
        metrics::record_fanout_page();

        let pages_emitted = msg.pages_emitted_so_far + 1;
        info!(
            post_id = %msg.post.post_id,
            viewers = batch.target_viewer_ids.len(),
            batch_sequence = batch.batch_sequence_number,
            "Enqueued feed batch write for follower page"
        );

        match page.next_cursor {
            Some(next_cursor) => {
                let continuation = FanOutMessage {
                    post: msg.post,
                    last_follower_position: Some(next_cursor),
                    pages_emitted_so_far: pages_emitted,
                };
                self.queue.enqueue_fan_out(&continuation).await?;
                metrics::record_fanout_continuation();
                Ok(StepOutcome::Continued { pages_emitted })
            }
            None => {
                info!(
                    post_id = %msg.post.post_id,
                    pages_emitted,
                    "Fan-out complete"
                );
                Ok(StepOutcome::Completed { pages_emitted })
            }
        }
    }
}
