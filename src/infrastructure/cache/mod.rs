pub mod keys;
pub mod store;

pub use keys::{artifact_path, format_key, ttl_for, InvalidKey, Kind, Namespace, KEY_DELIMITER};
pub use store::{ArtifactCache, CachedArtifact};
