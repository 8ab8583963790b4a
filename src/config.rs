/// Configuration management for feed-fanout-service
///
/// Loads configuration from environment variables.
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::queue::topics;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Application settings
    pub app: AppConfig,
    /// Database configuration
    pub database: DatabaseConfig,
    /// Redis configuration
    pub redis: RedisConfig,
    /// Kafka configuration
    pub kafka: KafkaConfig,
    /// Fan-out tuning
    pub fanout: FanoutConfig,
}

/// Application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Application environment (dev, staging, prod)
    pub env: String,
    /// Server host to bind to
    pub host: String,
    /// HTTP port for health checks and metrics
    pub http_port: u16,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database URL
    pub url: String,
    /// Max connections in pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Min connections in pool
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

/// Redis configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    /// Redis URL (redis://host:port)
    pub url: String,
}

/// Kafka configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KafkaConfig {
    #[serde(default = "default_kafka_brokers")]
    pub brokers: String,
    #[serde(default = "default_kafka_group_id")]
    pub group_id: String,
    #[serde(default = "default_fan_out_topic")]
    pub fan_out_topic: String,
    #[serde(default = "default_writes_topic")]
    pub writes_topic: String,
}

/// Fan-out and batch-write tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FanoutConfig {
    /// Followers fetched per fan-out step
    #[serde(default = "default_follower_page_size")]
    pub follower_page_size: usize,
    /// Store calls per chunk before unprocessed entries are dropped
    #[serde(default = "default_write_max_attempts")]
    pub write_max_attempts: u32,
    #[serde(default = "default_write_initial_backoff_ms")]
    pub write_initial_backoff_ms: u64,
    #[serde(default = "default_write_max_backoff_ms")]
    pub write_max_backoff_ms: u64,
}

// Default values
fn default_max_connections() -> u32 {
    20
}

fn default_min_connections() -> u32 {
    5
}

fn default_kafka_brokers() -> String {
    "localhost:9092".to_string()
}

fn default_kafka_group_id() -> String {
    "feed-fanout-service".to_string()
}

fn default_fan_out_topic() -> String {
    topics::FAN_OUT.to_string()
}

fn default_writes_topic() -> String {
    topics::FEED_WRITES.to_string()
}

fn default_follower_page_size() -> usize {
    100
}

fn default_write_max_attempts() -> u32 {
    3
}

fn default_write_initial_backoff_ms() -> u64 {
    1_000
}

fn default_write_max_backoff_ms() -> u64 {
    5_000
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let app = AppConfig {
            env: std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
            host: std::env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            http_port: env_parse("PORT", 8010),
        };

        let database = DatabaseConfig {
            url: std::env::var("DATABASE_URL")
                .context("DATABASE_URL environment variable not set")?,
            max_connections: env_parse("DB_MAX_CONNECTIONS", default_max_connections()),
            min_connections: env_parse("DB_MIN_CONNECTIONS", default_min_connections()),
        };

        let redis = RedisConfig {
            url: std::env::var("REDIS_URL").context("REDIS_URL environment variable not set")?,
        };

        let kafka = KafkaConfig {
            brokers: std::env::var("KAFKA_BROKERS").unwrap_or_else(|_| default_kafka_brokers()),
            group_id: std::env::var("KAFKA_GROUP_ID")
                .unwrap_or_else(|_| default_kafka_group_id()),
            fan_out_topic: std::env::var("KAFKA_FAN_OUT_TOPIC")
                .unwrap_or_else(|_| default_fan_out_topic()),
            writes_topic: std::env::var("KAFKA_FEED_WRITES_TOPIC")
                .unwrap_or_else(|_| default_writes_topic()),
        };

        let fanout = FanoutConfig {
            follower_page_size: env_parse("FANOUT_PAGE_SIZE", default_follower_page_size()),
            write_max_attempts: env_parse("FEED_WRITE_MAX_ATTEMPTS", default_write_max_attempts()),
            write_initial_backoff_ms: env_parse(
                "FEED_WRITE_INITIAL_BACKOFF_MS",
                default_write_initial_backoff_ms(),
            ),
            write_max_backoff_ms: env_parse(
                "FEED_WRITE_MAX_BACKOFF_MS",
                default_write_max_backoff_ms(),
            ),
        };

        Ok(Config {
            app,
            database,
            redis,
            kafka,
            fanout,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_default_values() {
        std::env::set_var("DATABASE_URL", "postgres://test");
        std::env::set_var("REDIS_URL", "redis://localhost");
        std::env::remove_var("KAFKA_BROKERS");
        std::env::remove_var("FANOUT_PAGE_SIZE");

        let config = Config::from_env().unwrap();

        assert_eq!(config.app.env, "development");
        assert_eq!(config.app.http_port, 8010);
        assert_eq!(config.kafka.brokers, "localhost:9092");
        assert_eq!(config.kafka.fan_out_topic, "feed.fanout");
        assert_eq!(config.kafka.writes_topic, "feed.fanout.writes");
        assert_eq!(config.fanout.follower_page_size, 100);
        assert_eq!(config.fanout.write_max_attempts, 3);
        assert_eq!(config.fanout.write_initial_backoff_ms, 1_000);
        assert_eq!(config.fanout.write_max_backoff_ms, 5_000);
    }

    #[test]
    #[serial]
    fn test_missing_database_url_is_an_error() {
        std::env::remove_var("DATABASE_URL");
        std::env::set_var("REDIS_URL", "redis://localhost");

        assert!(Config::from_env().is_err());
    }

    #[test]
    #[serial]
    fn test_overrides() {
        std::env::set_var("DATABASE_URL", "postgres://test");
        std::env::set_var("REDIS_URL", "redis://localhost");
        std::env::set_var("FANOUT_PAGE_SIZE", "250");
        std::env::set_var("KAFKA_FAN_OUT_TOPIC", "custom.fanout");

        let config = Config::from_env().unwrap();
        assert_eq!(config.fanout.follower_page_size, 250);
        assert_eq!(config.kafka.fan_out_topic, "custom.fanout");

        std::env::remove_var("FANOUT_PAGE_SIZE");
        std::env::remove_var("KAFKA_FAN_OUT_TOPIC");
    }
}
