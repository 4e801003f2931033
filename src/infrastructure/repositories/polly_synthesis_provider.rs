use super::news_repository::NewsStore;
use super::synthesis_provider::SynthesisProvider;
use crate::domain::audio::{get_voice_for_language, LanguageCode};
use async_trait::async_trait;
use aws_sdk_polly::{
    types::{Engine, OutputFormat, VoiceId},
    Client as PollyClient,
};
use std::sync::Arc;

/// AWS Polly implementation of the synthesis provider.
///
/// Reads the item text from the news store and synthesizes it with the
/// neural engine as MP3.
pub struct PollySynthesisProvider {
    polly_client: Arc<PollyClient>,
    news: Arc<dyn NewsStore>,
}

impl PollySynthesisProvider {
    pub fn new(polly_client: Arc<PollyClient>, news: Arc<dyn NewsStore>) -> Self {
        Self { polly_client, news }
    }

    async fn call_polly(&self, text: &str, language: LanguageCode) -> Result<Vec<u8>, String> {
        let voice_name = get_voice_for_language(language);
        let voice_id = VoiceId::from(voice_name);

        tracing::info!(
            language = %language,
            voice = voice_name,
            output_format = "Mp3",
            text_length = text.len(),
            "Calling AWS Polly synthesize_speech"
        );

        let result = self
            .polly_client
            .synthesize_speech()
            .text(text)
            .voice_id(voice_id.clone())
            .output_format(OutputFormat::Mp3)
            .engine(Engine::Neural)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(
                    error = ?e,
                    language = %language,
                    voice_id = ?voice_id,
                    text_length = text.len(),
                    "AWS Polly synthesize_speech failed"
                );
                format!("AWS Polly error: {e:?}")
            })?;

        let audio_stream = result.audio_stream.collect().await.map_err(|e| {
            tracing::error!(error = %e, "Failed to collect audio stream from Polly response");
            format!("Failed to read audio stream: {e}")
        })?;

        let audio_bytes = audio_stream.into_bytes().to_vec();
        tracing::debug!(
            audio_size = audio_bytes.len(),
            "Audio stream collected successfully"
        );

        Ok(audio_bytes)
    }
}

#[async_trait]
impl SynthesisProvider for PollySynthesisProvider {
    async fn generate(&self, item_id: i64, language: LanguageCode) -> Result<Vec<u8>, String> {
        let start_time = std::time::Instant::now();

        let item = self
            .news
            .find_item(item_id, language)
            .await?
            .ok_or_else(|| format!("news item {item_id} ({language}) has no source text"))?;

        let text = format!("{}. {}", item.title, item.body);
        let audio_data = self.call_polly(&text, language).await?;

        tracing::info!(
            provider = "polly",
            item_id = item_id,
            language = %language,
            latency_ms = start_time.elapsed().as_millis() as u64,
            characters_count = text.len(),
            audio_size_bytes = audio_data.len(),
            "TTS synthesis completed"
        );

        Ok(audio_data)
    }
}
