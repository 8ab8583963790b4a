//! Count reconciliation batch job.
//!
//! The batch writer is allowed to drop individual feed entries under
//! sustained throttling; cached follower/followee counters are not allowed
//! to drift permanently. This job recomputes true counts from the follow
//! directory for every user and overwrites drifted cached counters,
//! last-computed-wins. It never touches individual feed entries.

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::ServiceResult;
use crate::metrics;
use crate::models::UserProfile;
use crate::pagination::PageCursor;
use crate::stores::{FollowDirectory, UserDirectory};

#[derive(Debug, Clone)]
pub struct ReconcileConfig {
    /// Users fetched per directory page
    pub user_page_size: usize,
    /// Pause between users, to respect store throughput limits
    pub inter_user_delay: Duration,
    /// Additional passes over users that failed
    pub retry_passes: u32,
    /// Base delay before a retry pass; grows with the pass number
    pub retry_backoff: Duration,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            user_page_size: 100,
            inter_user_delay: Duration::from_millis(100),
            retry_passes: 3,
            retry_backoff: Duration::from_secs(1),
        }
    }
}

/// One corrected drift entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CountMismatch {
    pub user_id: Uuid,
    pub cached_follower: i64,
    pub actual_follower: i64,
    pub cached_followee: i64,
    pub actual_followee: i64,
}

#[derive(Debug, Default)]
pub struct ReconcileStats {
    pub users_checked: u64,
    pub mismatches: Vec<CountMismatch>,
    /// Users still failing after every retry pass; reported for manual
    /// follow-up, never silently discarded.
    pub failed_user_ids: Vec<Uuid>,
}

impl ReconcileStats {
    pub fn mismatches_fixed(&self) -> u64 {
        self.mismatches.len() as u64
    }

    pub fn drift_rate(&self) -> f64 {
        if self.users_checked == 0 {
            0.0
        } else {
            self.mismatches.len() as f64 / self.users_checked as f64
        }
    }
}

pub struct CountReconciliation {
    users: Arc<dyn UserDirectory>,
    follows: Arc<dyn FollowDirectory>,
    config: ReconcileConfig,
}

impl CountReconciliation {
    pub fn new(
        users: Arc<dyn UserDirectory>,
        follows: Arc<dyn FollowDirectory>,
        config: ReconcileConfig,
    ) -> Self {
        Self {
            users,
            follows,
            config,
        }
    }

    pub async fn run(&self) -> ServiceResult<ReconcileStats> {
        let result = self.sweep().await;
        match &result {
            Ok(stats) if stats.failed_user_ids.is_empty() => {
                metrics::record_job_run("reconcile", "success")
            }
            Ok(_) => metrics::record_job_run("reconcile", "partial"),
            Err(_) => metrics::record_job_run("reconcile", "error"),
        }
        result
    }

    async fn sweep(&self) -> ServiceResult<ReconcileStats> {
        info!(
            page_size = self.config.user_page_size,
            retry_passes = self.config.retry_passes,
            "Starting count reconciliation"
        );

        let mut stats = ReconcileStats::default();
        let mut failed: Vec<Uuid> = Vec::new();
        let mut cursor: Option<PageCursor> = None;

        loop {
            let page = self
                .users
                .page_of_users(cursor.as_ref(), self.config.user_page_size)
                .await?;

            for profile in &page.items {
                stats.users_checked += 1;
                match self.reconcile_user(profile).await {
                    Ok(Some(mismatch)) => {
                        metrics::record_count_mismatch();
                        stats.mismatches.push(mismatch);
                    }
                    Ok(None) => {}
                    Err(e) => {
                        warn!(
                            user_id = %profile.user_id,
                            error = %e,
                            "Failed to reconcile user, will retry"
                        );
                        failed.push(profile.user_id);
                    }
                }

                if !self.config.inter_user_delay.is_zero() {
                    sleep(self.config.inter_user_delay).await;
                }
            }

            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        // Bounded retry passes with increasing backoff for failed users.
        for pass in 1..=self.config.retry_passes {
            if failed.is_empty() {
                break;
            }
            let delay = self.config.retry_backoff * pass;
            info!(
                pass,
                remaining = failed.len(),
                delay_ms = delay.as_millis() as u64,
                "Retrying failed users"
            );
            if !delay.is_zero() {
                sleep(delay).await;
            }

            let mut still_failing = Vec::new();
            for user_id in failed.drain(..) {
                match self.users.get(user_id).await {
                    Ok(Some(profile)) => match self.reconcile_user(&profile).await {
                        Ok(Some(mismatch)) => {
                            metrics::record_count_mismatch();
                            stats.mismatches.push(mismatch);
                        }
                        Ok(None) => {}
                        Err(e) => {
                            warn!(user_id = %user_id, pass, error = %e, "Retry failed");
                            still_failing.push(user_id);
                        }
                    },
                    Ok(None) => {
                        debug!(user_id = %user_id, "User no longer in directory, skipping");
                    }
                    Err(e) => {
                        warn!(user_id = %user_id, pass, error = %e, "Retry lookup failed");
                        still_failing.push(user_id);
                    }
                }
            }
            failed = still_failing;
        }

        if !failed.is_empty() {
            warn!(
                failed_users = ?failed,
                "Users still failing after all retry passes, manual follow-up required"
            );
        }
        stats.failed_user_ids = failed;

        info!(
            users_checked = stats.users_checked,
            mismatches_fixed = stats.mismatches_fixed(),
            drift_rate = stats.drift_rate(),
            failed = stats.failed_user_ids.len(),
            "Count reconciliation finished"
        );
        Ok(stats)
    }

    /// Recompute one user's true counts and overwrite the cached counters
    /// on mismatch.
    async fn reconcile_user(&self, profile: &UserProfile) -> ServiceResult<Option<CountMismatch>> {
        let actual_follower = self.follows.active_follower_count(profile.user_id).await? as i64;
        let actual_followee = self.follows.active_followee_count(profile.user_id).await? as i64;

        if profile.follower_count == actual_follower && profile.followee_count == actual_followee {
            return Ok(None);
        }

        self.users
            .overwrite_counts(profile.user_id, actual_follower, actual_followee)
            .await?;

        info!(
            user_id = %profile.user_id,
            cached_follower = profile.follower_count,
            actual_follower,
            cached_followee = profile.followee_count,
            actual_followee,
            "Corrected drifted edge counters"
        );

        Ok(Some(CountMismatch {
            user_id: profile.user_id,
            cached_follower: profile.follower_count,
            actual_follower,
            cached_followee: profile.followee_count,
            actual_followee,
        }))
    }
}
