pub mod coordinator;
pub mod error;
pub mod language;
pub mod model;

pub use coordinator::AudioCoordinator;
pub use error::AudioError;
pub use language::{get_voice_for_language, LanguageCode};
pub use model::{content_hash, MergedAudio, NewsItem, ServedArtifact};
