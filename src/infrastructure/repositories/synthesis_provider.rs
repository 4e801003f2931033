use crate::domain::audio::LanguageCode;
use async_trait::async_trait;

/// Speech synthesis collaborator.
/// Abstracts the underlying TTS provider (AWS Polly, OpenAI, ElevenLabs, etc.)
///
/// Implementations are responsible for:
/// - Looking up the item text they synthesize from
/// - Provider-specific voice selection
/// - Returning playback-ready MP3 bytes
///
/// Potentially slow and potentially rate-limited; the coordinator treats any
/// error as a generation failure and does not retry it automatically.
#[async_trait]
pub trait SynthesisProvider: Send + Sync {
    /// Synthesize the audio artifact for a news item in the given language.
    ///
    /// # Errors
    /// Returns error if synthesis fails or the provider is unavailable
    async fn generate(&self, item_id: i64, language: LanguageCode) -> Result<Vec<u8>, String>;
}
