use crate::infrastructure::storage::StorageOptions;
use serde::Deserialize;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub aws_region: String,
    pub environment: Environment,
    pub log_format: LogFormat,
    // Artifact storage
    pub audio_base_path: PathBuf,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub buffer_size: usize,
    pub max_concurrent_operations: usize,
    pub enable_metrics: bool,
    // Fast-tier cache
    pub cache_capacity: u64,
    // Merged newscast
    pub merge_item_count: i64,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Development,
    Production,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

impl Config {
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        dotenvy::dotenv().ok();

        let defaults = StorageOptions::default();
        let config = Config {
            database_url: env::var("DATABASE_URL")?,
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()?,
            aws_region: env::var("AWS_REGION").unwrap_or_else(|_| "eu-west-1".to_string()),
            environment: env::var("ENVIRONMENT")
                .unwrap_or_else(|_| "development".to_string())
                .parse::<String>()
                .map(|s| match s.as_str() {
                    "production" => Environment::Production,
                    _ => Environment::Development,
                })?,
            log_format: env::var("LOG_FORMAT")
                .unwrap_or_else(|_| "pretty".to_string())
                .parse::<String>()
                .map(|s| match s.as_str() {
                    "json" => LogFormat::Json,
                    _ => LogFormat::Pretty,
                })?,
            audio_base_path: env::var("AUDIO_BASE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.base_path),
            max_retries: env::var("STORAGE_MAX_RETRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_retries),
            retry_delay_ms: env::var("STORAGE_RETRY_DELAY_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.retry_delay.as_millis() as u64),
            buffer_size: env::var("STORAGE_BUFFER_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.buffer_size),
            max_concurrent_operations: env::var("STORAGE_MAX_CONCURRENT_OPERATIONS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_concurrent_operations),
            enable_metrics: env::var("STORAGE_ENABLE_METRICS")
                .map(|s| s.to_lowercase() == "true")
                .unwrap_or(false),
            cache_capacity: env::var("AUDIO_CACHE_CAPACITY")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(256),
            merge_item_count: env::var("MERGE_ITEM_COUNT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(10),
        };

        Ok(config)
    }

    pub fn is_development(&self) -> bool {
        self.environment == Environment::Development
    }

    pub fn storage_options(&self) -> StorageOptions {
        StorageOptions {
            base_path: self.audio_base_path.clone(),
            max_retries: self.max_retries,
            retry_delay: Duration::from_millis(self.retry_delay_ms),
            buffer_size: self.buffer_size,
            max_concurrent_operations: self.max_concurrent_operations,
            enable_metrics: self.enable_metrics,
        }
    }
}
