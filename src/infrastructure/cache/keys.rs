use std::path::PathBuf;
use std::time::Duration;

/// Delimiter between the segments of a formatted cache key. Identifiers may
/// not contain it, which keeps the key format injective.
pub const KEY_DELIMITER: char = ':';

/// Top-level cache namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    Tts,
    Mp3,
    Hash,
    Feed,
}

impl Namespace {
    pub fn as_str(&self) -> &'static str {
        match self {
            Namespace::Tts => "tts",
            Namespace::Mp3 => "mp3",
            Namespace::Hash => "hash",
            Namespace::Feed => "feed",
        }
    }
}

/// Artifact kind within a namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    Metadata,
    Individual,
    Stream,
    Merge,
    Db,
    File,
    Meta,
    Disk,
    Batch,
}

impl Kind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Kind::Metadata => "metadata",
            Kind::Individual => "individual",
            Kind::Stream => "stream",
            Kind::Merge => "merge",
            Kind::Db => "db",
            Kind::File => "file",
            Kind::Meta => "meta",
            Kind::Disk => "disk",
            Kind::Batch => "batch",
        }
    }
}

/// Identifier rejected because it would break the key format.
#[derive(Debug, Clone, thiserror::Error)]
#[error("invalid cache identifier {id:?}: {reason}")]
pub struct InvalidKey {
    pub id: String,
    pub reason: &'static str,
}

/// Time-to-live class for a `(namespace, kind)` pair.
///
/// The hash namespace is one class regardless of kind; everything else is
/// classified by kind. The 45m database-mirror tier and the 2h file tier are
/// deliberately independent classes keyed by distinct kinds.
pub fn ttl_for(namespace: Namespace, kind: Kind) -> Duration {
    if namespace == Namespace::Hash {
        return Duration::from_secs(48 * 60 * 60);
    }
    match kind {
        Kind::Metadata | Kind::Meta => Duration::from_secs(60 * 60),
        Kind::Db | Kind::Batch => Duration::from_secs(45 * 60),
        Kind::File | Kind::Disk | Kind::Merge => Duration::from_secs(2 * 60 * 60),
        Kind::Stream => Duration::from_secs(24 * 60 * 60),
        Kind::Individual => Duration::from_secs(12 * 60 * 60),
    }
}

fn validate(id: &str) -> Result<(), InvalidKey> {
    if id.is_empty() {
        return Err(InvalidKey {
            id: id.to_string(),
            reason: "empty identifier",
        });
    }
    if id.contains(KEY_DELIMITER) {
        return Err(InvalidKey {
            id: id.to_string(),
            reason: "identifier contains the key delimiter",
        });
    }
    if id.contains('/') || id.contains('\\') {
        return Err(InvalidKey {
            id: id.to_string(),
            reason: "identifier contains a path separator",
        });
    }
    Ok(())
}

/// Format the cache key for `(namespace, kind, id)`.
///
/// The format is injective: distinct `(kind, id)` pairs never collide
/// because segments are joined with a delimiter the identifier cannot
/// contain.
pub fn format_key(namespace: Namespace, kind: Kind, id: &str) -> Result<String, InvalidKey> {
    validate(id)?;
    Ok(format!(
        "{}{KEY_DELIMITER}{}{KEY_DELIMITER}{}",
        namespace.as_str(),
        kind.as_str(),
        id
    ))
}

/// Stable on-disk relative path for an artifact, derived from the same
/// segments as the cache key so the same logical artifact always resolves
/// to the same file.
pub fn artifact_path(namespace: Namespace, kind: Kind, id: &str) -> Result<String, InvalidKey> {
    validate(id)?;
    let mut path = PathBuf::from(namespace.as_str());
    path.push(kind.as_str());
    path.push(format!("{id}.mp3"));
    Ok(path.to_string_lossy().into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn it_should_format_namespaced_keys() {
        let key = format_key(Namespace::Tts, Kind::Individual, "42-tr").unwrap();
        assert_eq!(key, "tts:individual:42-tr");
    }

    #[test]
    fn it_should_reject_identifiers_containing_the_delimiter() {
        let err = format_key(Namespace::Tts, Kind::Individual, "42:tr").unwrap_err();
        assert_eq!(err.id, "42:tr");
    }

    #[test]
    fn it_should_reject_empty_identifiers() {
        assert!(format_key(Namespace::Feed, Kind::Batch, "").is_err());
    }

    #[test]
    fn it_should_reject_path_separators_in_identifiers() {
        assert!(artifact_path(Namespace::Tts, Kind::Individual, "../42").is_err());
    }

    #[test]
    fn it_should_keep_distinct_pairs_distinct() {
        // "a:b-c" as (kind=a, id=b-c) cannot be forged from (kind=ab, id=c)
        // because identifiers cannot carry the delimiter.
        let left = format_key(Namespace::Mp3, Kind::Merge, "daily-en").unwrap();
        let right = format_key(Namespace::Mp3, Kind::Meta, "daily-en").unwrap();
        assert_ne!(left, right);
    }

    #[test]
    fn it_should_classify_ttls_per_table() {
        assert_eq!(
            ttl_for(Namespace::Tts, Kind::Metadata),
            Duration::from_secs(3600)
        );
        assert_eq!(
            ttl_for(Namespace::Tts, Kind::Db),
            Duration::from_secs(45 * 60)
        );
        assert_eq!(
            ttl_for(Namespace::Tts, Kind::File),
            Duration::from_secs(2 * 3600)
        );
        assert_eq!(
            ttl_for(Namespace::Hash, Kind::File),
            Duration::from_secs(48 * 3600)
        );
        assert_eq!(
            ttl_for(Namespace::Tts, Kind::Stream),
            Duration::from_secs(24 * 3600)
        );
        assert_eq!(
            ttl_for(Namespace::Tts, Kind::Individual),
            Duration::from_secs(12 * 3600)
        );
    }

    #[test]
    fn it_should_derive_stable_artifact_paths() {
        let path = artifact_path(Namespace::Tts, Kind::Individual, "42-tr").unwrap();
        assert_eq!(path, "tts/individual/42-tr.mp3");
    }
}
