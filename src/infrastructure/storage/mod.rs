pub mod backend;
pub mod envelope;
pub mod options;
pub mod retry;

pub use backend::{ByteStream, FileInfo, FileStore, PathStream};
pub use envelope::{FaultKind, StorageFault, StorageOutcome};
pub use options::StorageOptions;
pub use retry::{Backoff, RetryPolicy};
