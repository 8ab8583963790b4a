//! Offline count reconciliation runner.
//!
//! Recomputes true follower/followee counts for every user and overwrites
//! drifted cached counters. Exits non-zero on unrecoverable error; per-user
//! failures are retried and then reported in the summary.

use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use feed_fanout::jobs::{CountReconciliation, ReconcileConfig};
use feed_fanout::stores::{FollowDirectory, PgFollowDirectory, PgUserDirectory, UserDirectory};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "reconcile_counts=info,feed_fanout=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting count reconciliation run");

    let database_url =
        std::env::var("DATABASE_URL").context("DATABASE_URL environment variable not set")?;

    let pg_pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("Failed to connect to PostgreSQL")?;

    let users: Arc<dyn UserDirectory> = Arc::new(PgUserDirectory::new(pg_pool.clone()));
    let follows: Arc<dyn FollowDirectory> = Arc::new(PgFollowDirectory::new(pg_pool));

    let job = CountReconciliation::new(users, follows, ReconcileConfig::default());
    let stats = job.run().await.context("Reconciliation run failed")?;

    info!(
        users_checked = stats.users_checked,
        mismatches_fixed = stats.mismatches_fixed(),
        drift_rate = stats.drift_rate(),
        "Reconciliation summary"
    );
    for mismatch in &stats.mismatches {
        info!(
            user_id = %mismatch.user_id,
            cached_follower = mismatch.cached_follower,
            actual_follower = mismatch.actual_follower,
            cached_followee = mismatch.cached_followee,
            actual_followee = mismatch.actual_followee,
            "Corrected mismatch"
        );
    }
    if !stats.failed_user_ids.is_empty() {
        warn!(
            failed_users = ?stats.failed_user_ids,
            "Some users could not be reconciled, manual follow-up required"
        );
    }

    Ok(())
}
