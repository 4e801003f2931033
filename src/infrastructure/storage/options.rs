use std::path::PathBuf;
use std::time::Duration;

/// Process-wide storage configuration. Built once at startup from the
/// environment and never mutated afterwards.
#[derive(Debug, Clone)]
pub struct StorageOptions {
    /// Root directory; every path handed to the store resolves under it.
    pub base_path: PathBuf,
    /// Retry attempts for transient I/O failures.
    pub max_retries: u32,
    /// Base delay for retry backoff.
    pub retry_delay: Duration,
    /// Chunk size for streaming reads and writes.
    pub buffer_size: usize,
    /// Width of the global semaphore admitting filesystem calls.
    pub max_concurrent_operations: usize,
    /// Emit per-operation timing logs.
    pub enable_metrics: bool,
}

impl Default for StorageOptions {
    fn default() -> Self {
        Self {
            base_path: PathBuf::from("./data/audio"),
            max_retries: 3,
            retry_delay: Duration::from_secs(1),
            buffer_size: 128 * 1024,
            max_concurrent_operations: 30,
            enable_metrics: false,
        }
    }
}
