use actix_web::{web, App, HttpResponse, HttpServer, Responder};
use anyhow::{Context, Result};
use prometheus::{Encoder, TextEncoder};
use redis::aio::ConnectionManager;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use feed_fanout::cache::{FeedCacheStore, RedisFeedCacheStore};
use feed_fanout::config::Config;
use feed_fanout::consumers::{FanOutConsumer, FeedWriteConsumer};
use feed_fanout::fanout::{BatchWriter, BatchWriterConfig, FanoutCoordinator};
use feed_fanout::queue::{FanoutQueue, KafkaFanoutQueue};
use feed_fanout::stores::{FollowDirectory, PgFollowDirectory, PgUserDirectory, UserDirectory};

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut terminate =
            signal(SignalKind::terminate()).expect("Failed to install SIGTERM handler");

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = terminate.recv() => {},
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    }
}

async fn health() -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({ "status": "ok" }))
}

async fn metrics_text() -> impl Responder {
    let mut buffer = Vec::new();
    let encoder = TextEncoder::new();
    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
        error!(error = %e, "Failed to encode metrics");
        return HttpResponse::InternalServerError().finish();
    }
    HttpResponse::Ok()
        .content_type("text/plain; version=0.0.4")
        .body(buffer)
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting feed-fanout-service");

    let config = Config::from_env().context("Failed to load configuration")?;
    info!(
        env = %config.app.env,
        http_port = config.app.http_port,
        page_size = config.fanout.follower_page_size,
        "Configuration loaded"
    );

    // Database pool
    let pg_pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .min_connections(config.database.min_connections)
        .acquire_timeout(Duration::from_secs(10))
        .connect(&config.database.url)
        .await
        .context("Failed to connect to database")?;

    sqlx::query("SELECT 1")
        .execute(&pg_pool)
        .await
        .context("Failed to verify database connection")?;
    info!("Database pool created and verified");

    // Redis connection manager, constructed once and shared
    let redis_client =
        redis::Client::open(config.redis.url.as_str()).context("Failed to create Redis client")?;
    let redis_conn = ConnectionManager::new(redis_client)
        .await
        .context("Failed to connect to Redis")?;
    info!("Redis connection established");

    let feed_store: Arc<dyn FeedCacheStore> =
        Arc::new(RedisFeedCacheStore::new(Arc::new(redis_conn)));
    let follows: Arc<dyn FollowDirectory> = Arc::new(PgFollowDirectory::new(pg_pool.clone()));
    let users: Arc<dyn UserDirectory> = Arc::new(PgUserDirectory::new(pg_pool.clone()));
    let queue: Arc<dyn FanoutQueue> = Arc::new(KafkaFanoutQueue::new(&config.kafka)?);

    let coordinator = Arc::new(FanoutCoordinator::new(
        follows,
        users,
        queue,
        config.fanout.follower_page_size,
    ));
    let writer = BatchWriter::new(BatchWriterConfig::from(&config.fanout));

    let fan_out_consumer = FanOutConsumer::new(&config.kafka, coordinator)?;
    let feed_write_consumer = FeedWriteConsumer::new(&config.kafka, feed_store, writer)?;

    tokio::spawn(async move {
        if let Err(e) = fan_out_consumer.run().await {
            error!(error = %e, "Fan-out consumer exited");
        }
    });
    tokio::spawn(async move {
        if let Err(e) = feed_write_consumer.run().await {
            error!(error = %e, "Feed-write consumer exited");
        }
    });

    let server = HttpServer::new(|| {
        App::new()
            .route("/health", web::get().to(health))
            .route("/metrics", web::get().to(metrics_text))
    })
    .bind((config.app.host.as_str(), config.app.http_port))
    .context("Failed to bind HTTP server")?
    .run();
    info!(port = config.app.http_port, "Health and metrics endpoints listening");

    tokio::select! {
        res = server => {
            res.context("HTTP server failed")?;
        }
        _ = shutdown_signal() => {
            info!("Shutdown signal received, stopping feed-fanout-service");
        }
    }

    Ok(())
}
