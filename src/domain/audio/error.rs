use crate::infrastructure::cache::InvalidKey;
use crate::infrastructure::storage::{FaultKind, StorageFault};

/// Error taxonomy the coordinator surfaces to its callers.
///
/// Storage-level retries are already exhausted by the time one of these is
/// produced, so every variant is structural: the caller must re-request (or
/// give up), never spin on it.
#[derive(Debug, Clone, thiserror::Error)]
pub enum AudioError {
    /// The artifact genuinely does not exist upstream.
    #[error("artifact not found: {0}")]
    NotFound(String),

    /// The synthesis collaborator failed. Not retried automatically.
    #[error("audio generation failed: {0}")]
    GenerationFailed(String),

    /// The storage backend exhausted its retries.
    #[error("artifact storage failed: {0}")]
    StorageFailed(String),

    /// Identifier would break the cache key format. Programmer error.
    #[error(transparent)]
    InvalidKey(#[from] InvalidKey),

    /// The generation owner went away before settling.
    #[error("request cancelled")]
    Cancelled,
}

impl AudioError {
    /// Reclassify a storage fault at the coordinator boundary.
    pub fn from_storage(fault: StorageFault) -> Self {
        match fault.kind {
            FaultKind::NotFound => AudioError::NotFound(fault.message),
            FaultKind::Io => AudioError::StorageFailed(fault.message),
            FaultKind::Cancelled => AudioError::Cancelled,
        }
    }
}
