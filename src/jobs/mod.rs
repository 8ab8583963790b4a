pub mod backfill_feeds;
pub mod reconcile_counts;

pub use backfill_feeds::{BackfillConfig, BackfillStats, FeedBackfill};
pub use reconcile_counts::{CountMismatch, CountReconciliation, ReconcileConfig, ReconcileStats};
