use super::language::LanguageCode;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::sync::Arc;

/// A news item as read from the relational store. The coordinator only ever
/// reads these; publishing and editing happen elsewhere.
#[derive(Debug, Clone)]
pub struct NewsItem {
    pub id: i64,
    pub language: LanguageCode,
    pub title: String,
    pub body: String,
    pub published_at: DateTime<Utc>,
}

/// A generated artifact ready to serve from memory.
#[derive(Debug, Clone)]
pub struct ServedArtifact {
    pub bytes: Arc<Vec<u8>>,
    pub content_hash: String,
    pub cache_hit: bool,
}

/// Outcome of building (or finding) the merged newscast file. The audio
/// itself is streamed from disk, never buffered wholesale.
pub struct MergedAudio {
    pub stream: crate::infrastructure::storage::ByteStream,
    pub size_bytes: u64,
    pub content_hash: Option<String>,
}

impl std::fmt::Debug for MergedAudio {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MergedAudio")
            .field("size_bytes", &self.size_bytes)
            .field("content_hash", &self.content_hash)
            .finish_non_exhaustive()
    }
}

/// SHA-256 content hash used for dedup and idempotence checks.
pub fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}
