use super::error::AudioError;
use super::language::LanguageCode;
use super::model::{content_hash, MergedAudio, ServedArtifact};
use crate::infrastructure::cache::{artifact_path, format_key, ttl_for, ArtifactCache, Kind, Namespace};
use crate::infrastructure::repositories::{NewsStore, SynthesisProvider};
use crate::infrastructure::storage::{FaultKind, FileStore};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;

/// In-flight generations, one awaitable handle per key.
///
/// The first caller for a key becomes the generation owner; everyone else
/// attaches to the owner's watch channel and resolves with the owner's
/// outcome. The map entry is removed once the generation settles (or the
/// owner is dropped), so the map only ever holds live flights. The lock is
/// scoped to map mutation, never held across the generation itself.
struct Flight<T> {
    in_flight: Mutex<HashMap<String, watch::Receiver<Option<Result<T, AudioError>>>>>,
}

enum Role<T> {
    Owner(watch::Sender<Option<Result<T, AudioError>>>),
    Waiter(watch::Receiver<Option<Result<T, AudioError>>>),
}

struct FlightEntry<'a, T> {
    flight: &'a Flight<T>,
    key: &'a str,
}

impl<T> Drop for FlightEntry<'_, T> {
    fn drop(&mut self) {
        if let Ok(mut map) = self.flight.in_flight.lock() {
            map.remove(self.key);
        }
    }
}

impl<T: Clone> Flight<T> {
    fn new() -> Self {
        Self {
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// Run `make` for this key, or join a generation already in flight.
    ///
    /// A waiter dropping its future detaches only that waiter. If the owner
    /// is dropped before settling, its entry is removed and every remaining
    /// waiter resolves with `Cancelled`.
    async fn run<F, Fut>(&self, key: &str, make: F) -> Result<T, AudioError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, AudioError>>,
    {
        let role = {
            let mut map = self
                .in_flight
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            match map.get(key) {
                Some(rx) => Role::Waiter(rx.clone()),
                None => {
                    let (tx, rx) = watch::channel(None);
                    map.insert(key.to_string(), rx);
                    Role::Owner(tx)
                }
            }
        };

        match role {
            Role::Waiter(mut rx) => match rx.wait_for(|settled| settled.is_some()).await {
                Ok(settled) => settled.clone().unwrap_or(Err(AudioError::Cancelled)),
                // The owner went away without settling.
                Err(_) => Err(AudioError::Cancelled),
            },
            Role::Owner(tx) => {
                let _entry = FlightEntry { flight: self, key };
                let result = make().await;
                let _ = tx.send(Some(result.clone()));
                result
            }
        }
    }

    #[cfg(test)]
    fn in_flight_count(&self) -> usize {
        self.in_flight
            .lock()
            .map(|map| map.len())
            .unwrap_or_default()
    }
}

#[derive(Clone)]
struct ReadyArtifact {
    bytes: Arc<Vec<u8>>,
    content_hash: String,
}

#[derive(Clone)]
struct MergedMeta {
    content_hash: String,
    size_bytes: u64,
}

/// Key under which the merged newscast file lives.
const MERGED_ID: &str = "daily";

/// Orchestration core for audio artifacts.
///
/// Given an artifact identity, serves a fresh fast-tier copy, else reads
/// through to durable storage, else coalesces concurrent callers into a
/// single synthesis-and-store run. At most one generation is in flight per
/// key at any time, and a failed generation leaves the key absent so a later
/// request can retry.
pub struct AudioCoordinator {
    news: Arc<dyn NewsStore>,
    synthesis: Arc<dyn SynthesisProvider>,
    store: Arc<FileStore>,
    cache: Arc<ArtifactCache>,
    segments: Flight<ReadyArtifact>,
    merged: Flight<MergedMeta>,
    merge_item_count: i64,
}

impl AudioCoordinator {
    pub fn new(
        news: Arc<dyn NewsStore>,
        synthesis: Arc<dyn SynthesisProvider>,
        store: Arc<FileStore>,
        cache: Arc<ArtifactCache>,
        merge_item_count: i64,
    ) -> Self {
        Self {
            news,
            synthesis,
            store,
            cache,
            segments: Flight::new(),
            merged: Flight::new(),
            merge_item_count,
        }
    }

    /// Serve the audio artifact for one news item, generating it if needed.
    pub async fn get_or_generate(
        &self,
        id: i64,
        language: LanguageCode,
    ) -> Result<ServedArtifact, AudioError> {
        let id_segment = format!("{id}-{language}");
        let key = format_key(Namespace::Tts, Kind::Individual, &id_segment)?;
        let ttl = ttl_for(Namespace::Tts, Kind::Individual);

        if let Some(hit) = self.cache.get_fresh(&key, ttl).await {
            tracing::debug!(key = %key, size = hit.bytes.len(), "fast-tier hit");
            return Ok(ServedArtifact {
                bytes: hit.bytes,
                content_hash: hit.content_hash,
                cache_hit: true,
            });
        }

        let ready = self
            .segments
            .run(&key, || self.generate_segment(id, language, &key, &id_segment))
            .await?;

        Ok(ServedArtifact {
            bytes: ready.bytes,
            content_hash: ready.content_hash,
            cache_hit: false,
        })
    }

    /// Serve the latest artifact for a language.
    pub async fn get_last(&self, language: LanguageCode) -> Result<ServedArtifact, AudioError> {
        let item = self
            .news
            .latest_for_language(language)
            .await
            .map_err(AudioError::GenerationFailed)?
            .ok_or_else(|| AudioError::NotFound(format!("no news items for {language}")))?;
        self.get_or_generate(item.id, language).await
    }

    /// Serve the merged newscast file as a chunked byte stream.
    ///
    /// The merged file is rebuilt when its on-disk copy is older than the
    /// merge TTL class; rebuilds coalesce like segment generations. Serving
    /// always streams from disk so the merged audio is never buffered
    /// wholesale.
    pub async fn get_merged(&self) -> Result<MergedAudio, AudioError> {
        let key = format_key(Namespace::Mp3, Kind::Merge, MERGED_ID)?;
        let rel = artifact_path(Namespace::Mp3, Kind::Merge, MERGED_ID)?;
        let ttl = ttl_for(Namespace::Mp3, Kind::Merge);

        let info = self.store.get_file_info(&rel).await;
        if let Some(info) = info.data.filter(|i| i.is_file) {
            let age = info.modified.elapsed().unwrap_or(ttl);
            if age < ttl {
                tracing::debug!(path = %rel, size = info.size, "serving merged file from disk");
                let stream = self
                    .store
                    .read_large_file_as_stream(&rel)
                    .await
                    .into_result()
                    .map_err(AudioError::from_storage)?;
                return Ok(MergedAudio {
                    stream,
                    size_bytes: info.size,
                    content_hash: None,
                });
            }
        }

        let meta = self.merged.run(&key, || self.build_merged(&rel)).await?;
        let stream = self
            .store
            .read_large_file_as_stream(&rel)
            .await
            .into_result()
            .map_err(AudioError::from_storage)?;
        Ok(MergedAudio {
            stream,
            size_bytes: meta.size_bytes,
            content_hash: Some(meta.content_hash),
        })
    }

    /// Generation owner path for one segment: read through to durable
    /// storage, else synthesize, persist atomically, and register the key.
    async fn generate_segment(
        &self,
        id: i64,
        language: LanguageCode,
        key: &str,
        id_segment: &str,
    ) -> Result<ReadyArtifact, AudioError> {
        let rel = artifact_path(Namespace::Tts, Kind::Individual, id_segment)?;

        let read = self.store.read_all_bytes(&rel).await;
        if read.success {
            let bytes = Arc::new(read.data.unwrap_or_default());
            let hash = content_hash(&bytes);
            self.cache
                .insert(key.to_string(), Arc::clone(&bytes), hash.clone())
                .await;
            tracing::debug!(key = %key, path = %rel, "durable-tier hit");
            return Ok(ReadyArtifact {
                bytes,
                content_hash: hash,
            });
        }
        match read.fault_kind() {
            Some(FaultKind::NotFound) => {}
            Some(FaultKind::Cancelled) => return Err(AudioError::Cancelled),
            _ => {
                return Err(AudioError::StorageFailed(
                    read.error
                        .map(|f| f.message)
                        .unwrap_or_else(|| "durable read failed".to_string()),
                ))
            }
        }

        if self
            .news
            .find_item(id, language)
            .await
            .map_err(AudioError::GenerationFailed)?
            .is_none()
        {
            return Err(AudioError::NotFound(format!("news item {id} ({language})")));
        }

        let audio = self
            .synthesis
            .generate(id, language)
            .await
            .map_err(AudioError::GenerationFailed)?;

        let write = self.store.write_all_bytes(&rel, &audio).await;
        if !write.success {
            return match write.fault_kind() {
                Some(FaultKind::Cancelled) => Err(AudioError::Cancelled),
                _ => Err(AudioError::StorageFailed(
                    write
                        .error
                        .map(|f| f.message)
                        .unwrap_or_else(|| "artifact write failed".to_string()),
                )),
            };
        }

        let bytes = Arc::new(audio);
        let hash = content_hash(&bytes);
        self.cache
            .insert(key.to_string(), Arc::clone(&bytes), hash.clone())
            .await;

        tracing::info!(
            item_id = id,
            language = %language,
            path = %rel,
            size = bytes.len(),
            content_hash = %hash,
            "artifact generated and stored"
        );

        Ok(ReadyArtifact {
            bytes,
            content_hash: hash,
        })
    }

    /// Rebuild the merged newscast: generate every segment, then persist the
    /// concatenation in one atomic streamed write.
    async fn build_merged(&self, rel: &str) -> Result<MergedMeta, AudioError> {
        let items = self
            .news
            .items_for_merge(self.merge_item_count)
            .await
            .map_err(AudioError::GenerationFailed)?;
        if items.is_empty() {
            return Err(AudioError::NotFound("no news items to merge".to_string()));
        }

        let mut hasher = Sha256::new();
        let mut size_bytes = 0u64;
        let mut segments = Vec::with_capacity(items.len());
        for item in &items {
            let served = self.get_or_generate(item.id, item.language).await?;
            hasher.update(served.bytes.as_slice());
            size_bytes += served.bytes.len() as u64;
            segments.push(served.bytes);
        }
        let hash = format!("{:x}", hasher.finalize());

        // MP3 frames concatenate cleanly, so the merged file is the segment
        // bytes back to back, fed to the store as a chunk stream.
        let chunks = segments.into_iter().map(|segment| {
            Ok(Arc::try_unwrap(segment).unwrap_or_else(|shared| (*shared).clone()))
        });
        let stream: crate::infrastructure::storage::ByteStream =
            Box::pin(futures::stream::iter(chunks));

        let save = self.store.save_stream(stream, rel).await;
        if !save.success {
            return match save.fault_kind() {
                Some(FaultKind::Cancelled) => Err(AudioError::Cancelled),
                _ => Err(AudioError::StorageFailed(
                    save.error
                        .map(|f| f.message)
                        .unwrap_or_else(|| "merged write failed".to_string()),
                )),
            };
        }

        tracing::info!(
            path = %rel,
            items = self.merge_item_count,
            size = size_bytes,
            content_hash = %hash,
            "merged newscast rebuilt"
        );

        Ok(MergedMeta {
            content_hash: hash,
            size_bytes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn it_should_run_the_owner_once_and_share_the_outcome() {
        let flight: Flight<u32> = Flight::new();
        let calls = AtomicUsize::new(0);

        let (a, b, c) = tokio::join!(
            flight.run("k", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    tokio::task::yield_now().await;
                    Ok(7u32)
                }
            }),
            flight.run("k", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok(8u32) }
            }),
            flight.run("k", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok(9u32) }
            }),
        );

        // Only the first closure ran; the others joined its flight.
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!((a.unwrap(), b.unwrap(), c.unwrap()), (7, 7, 7));
        assert_eq!(flight.in_flight_count(), 0);
    }

    #[tokio::test]
    async fn it_should_share_failures_and_leave_the_key_absent() {
        let flight: Flight<u32> = Flight::new();

        let (a, b) = tokio::join!(
            flight.run("k", || async {
                tokio::task::yield_now().await;
                Err(AudioError::GenerationFailed("boom".to_string()))
            }),
            flight.run("k", || async { Ok(1u32) }),
        );

        assert!(matches!(a, Err(AudioError::GenerationFailed(_))));
        assert!(matches!(b, Err(AudioError::GenerationFailed(_))));

        // The key reverted to absent, so a fresh request may retry.
        let retry = flight.run("k", || async { Ok(5u32) }).await;
        assert_eq!(retry.unwrap(), 5);
    }

    #[tokio::test]
    async fn it_should_cancel_waiters_when_the_owner_is_dropped() {
        let flight: Arc<Flight<u32>> = Arc::new(Flight::new());

        let owner = {
            let flight = Arc::clone(&flight);
            tokio::spawn(async move {
                flight
                    .run("k", || async {
                        futures::future::pending::<()>().await;
                        Ok(0u32)
                    })
                    .await
            })
        };
        tokio::task::yield_now().await;

        let waiter = {
            let flight = Arc::clone(&flight);
            tokio::spawn(async move { flight.run("k", || async { Ok(1u32) }).await })
        };
        tokio::task::yield_now().await;

        owner.abort();
        let outcome = waiter.await.unwrap();
        assert!(matches!(outcome, Err(AudioError::Cancelled)));
        assert_eq!(flight.in_flight_count(), 0);
    }

    #[tokio::test]
    async fn it_should_not_couple_independent_keys() {
        let flight: Flight<u32> = Flight::new();
        let (a, b) = tokio::join!(
            flight.run("left", || async { Ok(1u32) }),
            flight.run("right", || async { Ok(2u32) }),
        );
        assert_eq!(a.unwrap(), 1);
        assert_eq!(b.unwrap(), 2);
    }
}
