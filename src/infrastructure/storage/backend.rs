use super::envelope::{FaultKind, StorageFault, StorageOutcome};
use super::options::StorageOptions;
use super::retry::RetryPolicy;
use futures::stream::Stream;
use std::path::{Component, Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use std::time::SystemTime;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::Semaphore;
use uuid::Uuid;

/// Lazy byte sequence produced by streaming reads. Finite; a new call to
/// `read_large_file_as_stream` re-reads from the start.
pub type ByteStream = Pin<Box<dyn Stream<Item = std::io::Result<Vec<u8>>> + Send>>;

/// Lazy sequence of relative paths produced by `list_files`. Finite and
/// restartable (call `list_files` again for a fresh pass).
pub type PathStream = Pin<Box<dyn Stream<Item = std::io::Result<String>> + Send>>;

/// Metadata for a stored file.
#[derive(Debug, Clone)]
pub struct FileInfo {
    pub size: u64,
    pub modified: SystemTime,
    pub is_file: bool,
}

/// Durable byte storage on the local filesystem.
///
/// All paths are relative to `options.base_path`. A global counting semaphore
/// of width `max_concurrent_operations` admits in-flight filesystem calls;
/// callers beyond the limit suspend until a slot frees. Transient I/O errors
/// are retried per the read/write policies, re-acquiring a semaphore slot for
/// each attempt. Full-file writes are atomic: write to a temp file in the
/// same directory, then rename over the destination.
pub struct FileStore {
    options: StorageOptions,
    semaphore: Arc<Semaphore>,
    read_retry: RetryPolicy,
    write_retry: RetryPolicy,
}

impl FileStore {
    pub fn new(options: StorageOptions) -> Self {
        let semaphore = Arc::new(Semaphore::new(options.max_concurrent_operations));
        let read_retry = RetryPolicy::linear(options.max_retries, options.retry_delay);
        let write_retry = RetryPolicy::exponential(options.max_retries, options.retry_delay);
        Self {
            options,
            semaphore,
            read_retry,
            write_retry,
        }
    }

    pub fn options(&self) -> &StorageOptions {
        &self.options
    }

    /// Resolve a relative path under the base directory, rejecting absolute
    /// paths and parent-directory escapes.
    fn resolve(&self, path: &str) -> Result<PathBuf, StorageFault> {
        let rel = Path::new(path);
        if rel.is_absolute()
            || rel
                .components()
                .any(|c| matches!(c, Component::ParentDir | Component::Prefix(_)))
        {
            return Err(StorageFault::io(format!(
                "path escapes storage root: {path}"
            )));
        }
        Ok(self.options.base_path.join(rel))
    }

    fn record(&self, op: &'static str, outcome_ok: bool, elapsed: std::time::Duration) {
        if self.options.enable_metrics {
            tracing::debug!(
                op = op,
                ok = outcome_ok,
                elapsed_ms = elapsed.as_millis() as u64,
                "storage operation"
            );
        }
    }

    /// Read a whole file into memory.
    pub async fn read_all_bytes(&self, path: &str) -> StorageOutcome<Vec<u8>> {
        let abs = match self.resolve(path) {
            Ok(p) => p,
            Err(fault) => return StorageOutcome::err(fault, std::time::Duration::ZERO),
        };
        let abs = abs.as_path();
        let outcome = self
            .read_retry
            .run(|| async move {
                let _permit = self.acquire().await?;
                tokio::fs::read(abs).await.map_err(|e| StorageFault::from_io(&e))
            })
            .await;
        self.record("read_all_bytes", outcome.success, outcome.elapsed);
        outcome
    }

    /// Open a file and return its contents as a lazy chunked stream.
    ///
    /// Each chunk read takes its own semaphore slot, so a slow consumer does
    /// not pin a slot for the lifetime of the stream. Dropping the stream at
    /// a chunk boundary abandons the read cleanly.
    pub async fn read_large_file_as_stream(&self, path: &str) -> StorageOutcome<ByteStream> {
        let started = std::time::Instant::now();
        let abs = match self.resolve(path) {
            Ok(p) => p,
            Err(fault) => return StorageOutcome::err(fault, started.elapsed()),
        };
        let abs_ref = abs.as_path();
        let opened = self
            .read_retry
            .run(|| async move {
                let _permit = self.acquire().await?;
                tokio::fs::File::open(abs_ref)
                    .await
                    .map_err(|e| StorageFault::from_io(&e))
            })
            .await;

        let file = match opened.into_result() {
            Ok(f) => f,
            Err(fault) => {
                self.record("read_large_file_as_stream", false, started.elapsed());
                return StorageOutcome::err(fault, started.elapsed());
            }
        };

        let semaphore = Arc::clone(&self.semaphore);
        let buffer_size = self.options.buffer_size;
        let stream = futures::stream::unfold(Some(file), move |state| {
            let semaphore = Arc::clone(&semaphore);
            async move {
                let mut file = state?;
                let permit = semaphore.acquire_owned().await.ok()?;
                let mut buf = vec![0u8; buffer_size];
                match file.read(&mut buf).await {
                    Ok(0) => None,
                    Ok(n) => {
                        buf.truncate(n);
                        drop(permit);
                        Some((Ok(buf), Some(file)))
                    }
                    Err(e) => Some((Err(e), None)),
                }
            }
        });

        self.record("read_large_file_as_stream", true, started.elapsed());
        StorageOutcome::ok(Box::pin(stream) as ByteStream, started.elapsed())
    }

    /// Write a whole file atomically: either the previous content or the
    /// fully new content is observable afterwards, never a partial write.
    pub async fn write_all_bytes(&self, path: &str, bytes: &[u8]) -> StorageOutcome<()> {
        let abs = match self.resolve(path) {
            Ok(p) => p,
            Err(fault) => return StorageOutcome::err(fault, std::time::Duration::ZERO),
        };
        let abs = abs.as_path();
        let outcome = self
            .write_retry
            .run(|| async move {
                let _permit = self.acquire().await?;
                Self::atomic_write(abs, bytes)
                    .await
                    .map_err(|e| StorageFault::from_io(&e))
            })
            .await;
        self.record("write_all_bytes", outcome.success, outcome.elapsed);
        outcome
    }

    /// UTF-8 convenience wrapper over `write_all_bytes`.
    pub async fn write_all_text(&self, path: &str, text: &str) -> StorageOutcome<()> {
        self.write_all_bytes(path, text.as_bytes()).await
    }

    /// Consume a byte stream and persist it with the atomic-write guarantee.
    ///
    /// The source stream is not restartable, so the write is a single pass:
    /// a mid-stream failure removes the temp file and surfaces one fault
    /// rather than re-running the stream.
    pub async fn save_stream(&self, mut stream: ByteStream, path: &str) -> StorageOutcome<()> {
        use futures::StreamExt;

        let started = std::time::Instant::now();
        let abs = match self.resolve(path) {
            Ok(p) => p,
            Err(fault) => return StorageOutcome::err(fault, started.elapsed()),
        };

        let result: Result<(), StorageFault> = async {
            let _permit = self.acquire().await?;
            if let Some(parent) = abs.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| StorageFault::from_io(&e))?;
            }
            let tmp = Self::temp_sibling(&abs);
            let mut file = match tokio::fs::File::create(&tmp).await {
                Ok(f) => f,
                Err(e) => return Err(StorageFault::from_io(&e)),
            };
            while let Some(chunk) = stream.next().await {
                let chunk = match chunk {
                    Ok(c) => c,
                    Err(e) => {
                        let fault = StorageFault::from_io(&e);
                        let _ = tokio::fs::remove_file(&tmp).await;
                        return Err(fault);
                    }
                };
                if let Err(e) = file.write_all(&chunk).await {
                    let fault = StorageFault::from_io(&e);
                    let _ = tokio::fs::remove_file(&tmp).await;
                    return Err(fault);
                }
            }
            if let Err(e) = file.flush().await {
                let fault = StorageFault::from_io(&e);
                let _ = tokio::fs::remove_file(&tmp).await;
                return Err(fault);
            }
            drop(file);
            if let Err(e) = tokio::fs::rename(&tmp, &abs).await {
                let fault = StorageFault::from_io(&e);
                let _ = tokio::fs::remove_file(&tmp).await;
                return Err(fault);
            }
            Ok(())
        }
        .await;

        let elapsed = started.elapsed();
        self.record("save_stream", result.is_ok(), elapsed);
        match result {
            Ok(()) => StorageOutcome::ok((), elapsed),
            Err(fault) => StorageOutcome::err(fault, elapsed),
        }
    }

    /// Delete a file. Absence of the target is success, not an error, and
    /// repeated deletes stay successful.
    pub async fn delete_file(&self, path: &str) -> StorageOutcome<()> {
        let abs = match self.resolve(path) {
            Ok(p) => p,
            Err(fault) => return StorageOutcome::err(fault, std::time::Duration::ZERO),
        };
        let abs = abs.as_path();
        let outcome = self
            .write_retry
            .run(|| async move {
                let _permit = self.acquire().await?;
                match tokio::fs::remove_file(abs).await {
                    Ok(()) => Ok(()),
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                    Err(e) => Err(StorageFault::from_io(&e)),
                }
            })
            .await;
        self.record("delete_file", outcome.success, outcome.elapsed);
        outcome
    }

    pub async fn file_exists(&self, path: &str) -> StorageOutcome<bool> {
        self.exists_with("file_exists", path, |m| m.is_file()).await
    }

    pub async fn directory_exists(&self, path: &str) -> StorageOutcome<bool> {
        self.exists_with("directory_exists", path, |m| m.is_dir())
            .await
    }

    async fn exists_with(
        &self,
        op: &'static str,
        path: &str,
        check: fn(&std::fs::Metadata) -> bool,
    ) -> StorageOutcome<bool> {
        let abs = match self.resolve(path) {
            Ok(p) => p,
            Err(fault) => return StorageOutcome::err(fault, std::time::Duration::ZERO),
        };
        let abs = abs.as_path();
        let outcome = self
            .read_retry
            .run(|| async move {
                let _permit = self.acquire().await?;
                match tokio::fs::metadata(abs).await {
                    Ok(meta) => Ok(check(&meta)),
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
                    Err(e) => Err(StorageFault::from_io(&e)),
                }
            })
            .await;
        self.record(op, outcome.success, outcome.elapsed);
        outcome
    }

    /// Size, modification time and kind of a stored file.
    pub async fn get_file_info(&self, path: &str) -> StorageOutcome<FileInfo> {
        let abs = match self.resolve(path) {
            Ok(p) => p,
            Err(fault) => return StorageOutcome::err(fault, std::time::Duration::ZERO),
        };
        let abs = abs.as_path();
        let outcome = self
            .read_retry
            .run(|| async move {
                let _permit = self.acquire().await?;
                let meta = tokio::fs::metadata(abs)
                    .await
                    .map_err(|e| StorageFault::from_io(&e))?;
                let modified = meta.modified().map_err(|e| StorageFault::from_io(&e))?;
                Ok(FileInfo {
                    size: meta.len(),
                    modified,
                    is_file: meta.is_file(),
                })
            })
            .await;
        self.record("get_file_info", outcome.success, outcome.elapsed);
        outcome
    }

    /// Walk the storage root and yield relative paths of files whose path
    /// matches the glob-style pattern (`*` and `?` wildcards).
    pub async fn list_files(&self, pattern: &str) -> StorageOutcome<PathStream> {
        let started = std::time::Instant::now();
        let matcher = match Self::compile_pattern(pattern) {
            Ok(m) => m,
            Err(fault) => return StorageOutcome::err(fault, started.elapsed()),
        };
        let base = self.options.base_path.clone();
        let semaphore = Arc::clone(&self.semaphore);

        // Depth-first walk with an explicit directory stack; each read_dir
        // pass takes one semaphore slot.
        struct Walk {
            base: PathBuf,
            dirs: Vec<PathBuf>,
            files: Vec<String>,
            matcher: regex::Regex,
            semaphore: Arc<Semaphore>,
        }

        let walk = Walk {
            dirs: vec![base.clone()],
            base,
            files: Vec::new(),
            matcher,
            semaphore,
        };

        let stream = futures::stream::unfold(walk, |mut walk| async move {
            loop {
                if let Some(rel) = walk.files.pop() {
                    return Some((Ok(rel), walk));
                }
                let dir = walk.dirs.pop()?;
                let permit = walk.semaphore.clone().acquire_owned().await.ok()?;
                let mut entries = match tokio::fs::read_dir(&dir).await {
                    Ok(e) => e,
                    Err(err) if err.kind() == std::io::ErrorKind::NotFound => continue,
                    Err(err) => return Some((Err(err), walk)),
                };
                loop {
                    match entries.next_entry().await {
                        Ok(Some(entry)) => {
                            let path = entry.path();
                            match entry.file_type().await {
                                Ok(ft) if ft.is_dir() => walk.dirs.push(path),
                                Ok(ft) if ft.is_file() => {
                                    if let Ok(rel) = path.strip_prefix(&walk.base) {
                                        let rel = rel.to_string_lossy().into_owned();
                                        if walk.matcher.is_match(&rel) {
                                            walk.files.push(rel);
                                        }
                                    }
                                }
                                _ => {}
                            }
                        }
                        Ok(None) => break,
                        Err(err) => return Some((Err(err), walk)),
                    }
                }
                drop(permit);
            }
        });

        self.record("list_files", true, started.elapsed());
        StorageOutcome::ok(Box::pin(stream) as PathStream, started.elapsed())
    }

    /// Move a file. Prefers an atomic rename; falls back to copy-then-delete
    /// across filesystems, cleaning up a partial destination on failure.
    pub async fn move_file(&self, src: &str, dst: &str) -> StorageOutcome<()> {
        let (abs_src, abs_dst) = match (self.resolve(src), self.resolve(dst)) {
            (Ok(s), Ok(d)) => (s, d),
            (Err(fault), _) | (_, Err(fault)) => {
                return StorageOutcome::err(fault, std::time::Duration::ZERO)
            }
        };
        let (abs_src, abs_dst) = (abs_src.as_path(), abs_dst.as_path());
        let outcome = self
            .write_retry
            .run(|| async move {
                let _permit = self.acquire().await?;
                if let Some(parent) = abs_dst.parent() {
                    tokio::fs::create_dir_all(parent)
                        .await
                        .map_err(|e| StorageFault::from_io(&e))?;
                }
                match tokio::fs::rename(abs_src, abs_dst).await {
                    Ok(()) => Ok(()),
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                        Err(StorageFault::from_io(&e))
                    }
                    // Cross-device or other rename refusal: copy, then delete.
                    Err(_) => {
                        if let Err(e) = tokio::fs::copy(abs_src, abs_dst).await {
                            let _ = tokio::fs::remove_file(abs_dst).await;
                            return Err(StorageFault::from_io(&e));
                        }
                        tokio::fs::remove_file(abs_src)
                            .await
                            .map_err(|e| StorageFault::from_io(&e))
                    }
                }
            })
            .await;
        self.record("move_file", outcome.success, outcome.elapsed);
        outcome
    }

    /// Create a directory and any missing parents. Idempotent.
    pub async fn create_directory(&self, path: &str) -> StorageOutcome<()> {
        let abs = match self.resolve(path) {
            Ok(p) => p,
            Err(fault) => return StorageOutcome::err(fault, std::time::Duration::ZERO),
        };
        let abs = abs.as_path();
        let outcome = self
            .write_retry
            .run(|| async move {
                let _permit = self.acquire().await?;
                tokio::fs::create_dir_all(abs)
                    .await
                    .map_err(|e| StorageFault::from_io(&e))
            })
            .await;
        self.record("create_directory", outcome.success, outcome.elapsed);
        outcome
    }

    async fn acquire(&self) -> Result<tokio::sync::SemaphorePermit<'_>, StorageFault> {
        self.semaphore
            .acquire()
            .await
            .map_err(|_| StorageFault::new(FaultKind::Cancelled, "storage shutting down"))
    }

    async fn atomic_write(abs: &Path, bytes: &[u8]) -> std::io::Result<()> {
        if let Some(parent) = abs.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = Self::temp_sibling(abs);
        if let Err(e) = tokio::fs::write(&tmp, bytes).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e);
        }
        if let Err(e) = tokio::fs::rename(&tmp, abs).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e);
        }
        Ok(())
    }

    /// Temp file in the same directory as the target, so the final rename
    /// stays on one filesystem.
    fn temp_sibling(abs: &Path) -> PathBuf {
        let name = abs
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "artifact".to_string());
        abs.with_file_name(format!(".{name}.{}.tmp", Uuid::new_v4()))
    }

    fn compile_pattern(pattern: &str) -> Result<regex::Regex, StorageFault> {
        let mut translated = String::with_capacity(pattern.len() + 8);
        translated.push('^');
        for ch in pattern.chars() {
            match ch {
                '*' => translated.push_str(".*"),
                '?' => translated.push('.'),
                other => translated.push_str(&regex::escape(&other.to_string())),
            }
        }
        translated.push('$');
        regex::Regex::new(&translated)
            .map_err(|e| StorageFault::io(format!("bad list pattern {pattern:?}: {e}")))
    }
}
