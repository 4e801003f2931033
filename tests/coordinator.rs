// Integration tests for the artifact cache coordinator, run against fake
// collaborators and a temp-directory storage backend.

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use futures::StreamExt;
use newscast_backend::domain::audio::{
    AudioCoordinator, AudioError, LanguageCode, NewsItem,
};
use newscast_backend::infrastructure::cache::ArtifactCache;
use newscast_backend::infrastructure::repositories::{NewsStore, SynthesisProvider};
use newscast_backend::infrastructure::storage::{FaultKind, FileStore, StorageOptions};
use pretty_assertions::assert_eq;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

struct FakeNews {
    items: Vec<NewsItem>,
}

impl FakeNews {
    fn with_items(items: &[(i64, LanguageCode)]) -> Self {
        let now = Utc::now();
        let items = items
            .iter()
            .enumerate()
            .map(|(i, (id, language))| NewsItem {
                id: *id,
                language: *language,
                title: format!("Headline {id}"),
                body: format!("Body of item {id}"),
                published_at: now - ChronoDuration::minutes(i as i64),
            })
            .collect();
        Self { items }
    }

    fn empty() -> Self {
        Self { items: Vec::new() }
    }
}

#[async_trait]
impl NewsStore for FakeNews {
    async fn find_item(
        &self,
        id: i64,
        language: LanguageCode,
    ) -> Result<Option<NewsItem>, String> {
        Ok(self
            .items
            .iter()
            .find(|item| item.id == id && item.language == language)
            .cloned())
    }

    async fn latest_for_language(
        &self,
        language: LanguageCode,
    ) -> Result<Option<NewsItem>, String> {
        Ok(self
            .items
            .iter()
            .filter(|item| item.language == language)
            .max_by_key(|item| item.published_at)
            .cloned())
    }

    async fn items_for_merge(&self, limit: i64) -> Result<Vec<NewsItem>, String> {
        let mut items = self.items.clone();
        items.sort_by_key(|item| std::cmp::Reverse(item.published_at));
        items.truncate(limit as usize);
        Ok(items)
    }
}

struct FakeSynthesis {
    calls: AtomicUsize,
    failures_remaining: AtomicUsize,
    delay: Duration,
}

impl FakeSynthesis {
    fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            failures_remaining: AtomicUsize::new(0),
            delay: Duration::ZERO,
        }
    }

    fn failing_first(failures: usize) -> Self {
        Self {
            failures_remaining: AtomicUsize::new(failures),
            ..Self::new()
        }
    }

    fn slow(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::new()
        }
    }

    fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SynthesisProvider for FakeSynthesis {
    async fn generate(&self, item_id: i64, language: LanguageCode) -> Result<Vec<u8>, String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        // Yield once so concurrently polled requesters can attach to the
        // in-flight generation before it settles.
        tokio::task::yield_now().await;
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self
            .failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err("synthesis provider unavailable".to_string());
        }
        Ok(format!("mp3-{item_id}-{language}").into_bytes())
    }
}

struct Harness {
    _dir: TempDir,
    coordinator: Arc<AudioCoordinator>,
    synthesis: Arc<FakeSynthesis>,
    store: Arc<FileStore>,
}

fn harness(news: FakeNews, synthesis: FakeSynthesis) -> Harness {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(FileStore::new(StorageOptions {
        base_path: dir.path().to_path_buf(),
        retry_delay: Duration::from_millis(1),
        ..StorageOptions::default()
    }));
    let synthesis = Arc::new(synthesis);
    let coordinator = Arc::new(AudioCoordinator::new(
        Arc::new(news),
        synthesis.clone(),
        store.clone(),
        Arc::new(ArtifactCache::new(64)),
        10,
    ));
    Harness {
        _dir: dir,
        coordinator,
        synthesis,
        store,
    }
}

#[tokio::test]
async fn it_should_serve_cached_bytes_without_resynthesizing() {
    let h = harness(
        FakeNews::with_items(&[(42, LanguageCode::Turkish)]),
        FakeSynthesis::new(),
    );

    let first = h
        .coordinator
        .get_or_generate(42, LanguageCode::Turkish)
        .await
        .unwrap();
    assert!(!first.cache_hit);
    assert_eq!(first.bytes.as_slice(), b"mp3-42-tr");

    let second = h
        .coordinator
        .get_or_generate(42, LanguageCode::Turkish)
        .await
        .unwrap();
    assert!(second.cache_hit);
    assert_eq!(second.bytes, first.bytes);
    assert_eq!(second.content_hash, first.content_hash);

    assert_eq!(h.synthesis.call_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn it_should_coalesce_ten_concurrent_requests_into_one_generation() {
    let h = harness(
        FakeNews::with_items(&[(7, LanguageCode::English)]),
        FakeSynthesis::slow(Duration::from_millis(200)),
    );

    let requests = (0..10).map(|_| h.coordinator.get_or_generate(7, LanguageCode::English));
    let results = futures::future::join_all(requests).await;

    for served in results {
        let served = served.unwrap();
        assert_eq!(served.bytes.as_slice(), b"mp3-7-en");
    }
    assert_eq!(h.synthesis.call_count(), 1);
}

#[tokio::test]
async fn it_should_return_not_found_for_unknown_items() {
    let h = harness(FakeNews::empty(), FakeSynthesis::new());

    let err = h
        .coordinator
        .get_or_generate(99, LanguageCode::English)
        .await
        .unwrap_err();
    assert!(matches!(err, AudioError::NotFound(_)));
    assert_eq!(h.synthesis.call_count(), 0);
}

#[tokio::test]
async fn it_should_leave_no_state_behind_a_failed_generation() {
    let h = harness(
        FakeNews::with_items(&[(42, LanguageCode::Turkish)]),
        FakeSynthesis::failing_first(1),
    );

    let err = h
        .coordinator
        .get_or_generate(42, LanguageCode::Turkish)
        .await
        .unwrap_err();
    assert!(matches!(err, AudioError::GenerationFailed(_)));

    // Nothing was written, so the durable tier reports a clean miss.
    let read = h.store.read_all_bytes("tts/individual/42-tr.mp3").await;
    assert_eq!(read.fault_kind(), Some(FaultKind::NotFound));

    // The key reverted to absent: a later request retries and succeeds.
    let served = h
        .coordinator
        .get_or_generate(42, LanguageCode::Turkish)
        .await
        .unwrap();
    assert_eq!(served.bytes.as_slice(), b"mp3-42-tr");
    assert_eq!(h.synthesis.call_count(), 2);
}

#[tokio::test]
async fn it_should_share_a_failure_with_all_concurrent_waiters() {
    let h = harness(
        FakeNews::with_items(&[(7, LanguageCode::English)]),
        FakeSynthesis::failing_first(1),
    );

    let (a, b, c) = tokio::join!(
        h.coordinator.get_or_generate(7, LanguageCode::English),
        h.coordinator.get_or_generate(7, LanguageCode::English),
        h.coordinator.get_or_generate(7, LanguageCode::English),
    );

    assert!(matches!(a, Err(AudioError::GenerationFailed(_))));
    assert!(matches!(b, Err(AudioError::GenerationFailed(_))));
    assert!(matches!(c, Err(AudioError::GenerationFailed(_))));
    assert_eq!(h.synthesis.call_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn it_should_regenerate_after_ttl_expiry_when_the_durable_copy_is_gone() {
    let h = harness(
        FakeNews::with_items(&[(42, LanguageCode::Turkish)]),
        FakeSynthesis::new(),
    );

    h.coordinator
        .get_or_generate(42, LanguageCode::Turkish)
        .await
        .unwrap();
    assert!(h.store.delete_file("tts/individual/42-tr.mp3").await.success);

    // Individual-segment entries live 12 hours.
    tokio::time::advance(Duration::from_secs(12 * 3600) + Duration::from_nanos(1)).await;

    let served = h
        .coordinator
        .get_or_generate(42, LanguageCode::Turkish)
        .await
        .unwrap();
    assert!(!served.cache_hit);
    assert_eq!(h.synthesis.call_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn it_should_read_through_to_the_durable_tier_after_fast_tier_expiry() {
    let h = harness(
        FakeNews::with_items(&[(42, LanguageCode::Turkish)]),
        FakeSynthesis::new(),
    );

    let first = h
        .coordinator
        .get_or_generate(42, LanguageCode::Turkish)
        .await
        .unwrap();

    tokio::time::advance(Duration::from_secs(12 * 3600) + Duration::from_nanos(1)).await;

    // The fast tier expired, but the artifact file is still on disk; it is
    // re-served and re-registered without a second synthesis call.
    let second = h
        .coordinator
        .get_or_generate(42, LanguageCode::Turkish)
        .await
        .unwrap();
    assert!(!second.cache_hit);
    assert_eq!(second.bytes, first.bytes);
    assert_eq!(h.synthesis.call_count(), 1);
}

#[tokio::test]
async fn it_should_serve_the_latest_item_for_a_language() {
    let h = harness(
        FakeNews::with_items(&[
            (1, LanguageCode::English),
            (2, LanguageCode::English),
            (3, LanguageCode::Turkish),
        ]),
        FakeSynthesis::new(),
    );

    // Items are published newest-first in the fixture, so id=1 is latest.
    let served = h.coordinator.get_last(LanguageCode::English).await.unwrap();
    assert_eq!(served.bytes.as_slice(), b"mp3-1-en");

    let err = h.coordinator.get_last(LanguageCode::German).await.unwrap_err();
    assert!(matches!(err, AudioError::NotFound(_)));
}

#[tokio::test]
async fn it_should_build_and_stream_the_merged_newscast() {
    let h = harness(
        FakeNews::with_items(&[
            (1, LanguageCode::English),
            (2, LanguageCode::Turkish),
            (3, LanguageCode::German),
        ]),
        FakeSynthesis::new(),
    );

    let merged = h.coordinator.get_merged().await.unwrap();
    assert!(merged.content_hash.is_some());

    let bytes: Vec<u8> = merged
        .stream
        .map(|chunk| chunk.unwrap())
        .collect::<Vec<_>>()
        .await
        .concat();
    assert_eq!(bytes, b"mp3-1-enmp3-2-trmp3-3-de".to_vec());
    assert_eq!(merged.size_bytes, bytes.len() as u64);
    assert_eq!(h.synthesis.call_count(), 3);

    // A repeat request within the merge TTL streams the on-disk file and
    // does not resynthesize anything.
    let again = h.coordinator.get_merged().await.unwrap();
    assert!(again.content_hash.is_none());
    let bytes_again: Vec<u8> = again
        .stream
        .map(|chunk| chunk.unwrap())
        .collect::<Vec<_>>()
        .await
        .concat();
    assert_eq!(bytes_again, bytes);
    assert_eq!(h.synthesis.call_count(), 3);
}

#[tokio::test]
async fn it_should_report_not_found_when_there_is_nothing_to_merge() {
    let h = harness(FakeNews::empty(), FakeSynthesis::new());

    let err = h.coordinator.get_merged().await.unwrap_err();
    assert!(matches!(err, AudioError::NotFound(_)));
}
