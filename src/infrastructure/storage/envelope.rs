use std::time::Duration;

/// Classification of a failed storage operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    /// The target does not exist. Never retried.
    NotFound,
    /// Transient I/O failure. Retried up to the policy's attempt limit.
    Io,
    /// The operation was interrupted by shutdown or caller cancellation.
    Cancelled,
}

/// A failed storage operation: what happened and why.
#[derive(Debug, Clone)]
pub struct StorageFault {
    pub kind: FaultKind,
    pub message: String,
}

impl StorageFault {
    pub fn new(kind: FaultKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(FaultKind::NotFound, message)
    }

    pub fn io(message: impl Into<String>) -> Self {
        Self::new(FaultKind::Io, message)
    }

    /// Classify a raw I/O error into the storage fault taxonomy.
    pub fn from_io(err: &std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::not_found(err.to_string()),
            _ => Self::io(err.to_string()),
        }
    }
}

impl std::fmt::Display for StorageFault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.kind {
            FaultKind::NotFound => write!(f, "not found: {}", self.message),
            FaultKind::Io => write!(f, "io failure: {}", self.message),
            FaultKind::Cancelled => write!(f, "cancelled: {}", self.message),
        }
    }
}

/// Uniform outcome of a storage operation.
///
/// Every `FileStore` operation returns one of these instead of raising on
/// expected failure modes (missing file, permission error, disk full).
/// Exactly one of `data`/`error` is set, consistent with `success`, and
/// `elapsed` covers all retry attempts of the operation.
#[derive(Debug)]
pub struct StorageOutcome<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<StorageFault>,
    pub elapsed: Duration,
}

impl<T> StorageOutcome<T> {
    pub fn ok(data: T, elapsed: Duration) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            elapsed,
        }
    }

    pub fn err(fault: StorageFault, elapsed: Duration) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(fault),
            elapsed,
        }
    }

    /// Fault classification, if this outcome is a failure.
    pub fn fault_kind(&self) -> Option<FaultKind> {
        self.error.as_ref().map(|f| f.kind)
    }

    /// Collapse the envelope into a plain `Result` for callers that want
    /// `?`-style propagation.
    pub fn into_result(self) -> Result<T, StorageFault> {
        match self.data {
            Some(data) => Ok(data),
            None => Err(self
                .error
                .unwrap_or_else(|| StorageFault::io("outcome carried no data and no fault"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn it_should_hold_data_on_success() {
        let outcome = StorageOutcome::ok(vec![1u8, 2, 3], Duration::from_millis(5));
        assert!(outcome.success);
        assert_eq!(outcome.data, Some(vec![1u8, 2, 3]));
        assert!(outcome.error.is_none());
    }

    #[test]
    fn it_should_hold_fault_on_failure() {
        let outcome: StorageOutcome<Vec<u8>> =
            StorageOutcome::err(StorageFault::not_found("gone"), Duration::from_millis(1));
        assert!(!outcome.success);
        assert!(outcome.data.is_none());
        assert_eq!(outcome.fault_kind(), Some(FaultKind::NotFound));
    }

    #[test]
    fn it_should_classify_io_errors() {
        let missing = std::io::Error::new(std::io::ErrorKind::NotFound, "no such file");
        assert_eq!(StorageFault::from_io(&missing).kind, FaultKind::NotFound);

        let refused = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        assert_eq!(StorageFault::from_io(&refused).kind, FaultKind::Io);
    }
}
