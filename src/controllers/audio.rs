use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
};
use std::sync::Arc;

use crate::{
    domain::audio::{AudioCoordinator, LanguageCode},
    error::{AppError, AppResult},
};

pub struct AudioController {
    coordinator: Arc<AudioCoordinator>,
}

impl AudioController {
    pub fn new(coordinator: Arc<AudioCoordinator>) -> Self {
        Self { coordinator }
    }

    fn parse_language(lang: &str) -> AppResult<LanguageCode> {
        lang.parse::<LanguageCode>().map_err(AppError::BadRequest)
    }

    fn audio_headers(content_hash: Option<&str>, cache_hit: Option<bool>) -> AppResult<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            "audio/mpeg"
                .parse()
                .map_err(|_| AppError::Internal("bad content type header".to_string()))?,
        );
        if let Some(hash) = content_hash {
            if let Ok(value) = hash.parse() {
                headers.insert("X-Content-Hash", value);
            }
        }
        if let Some(hit) = cache_hit {
            if let Ok(value) = if hit { "hit" } else { "miss" }.parse() {
                headers.insert("X-Cache", value);
            }
        }
        Ok(headers)
    }

    /// GET /api/audio/:id/:lang - Serve one news item's audio artifact
    pub async fn get_segment(
        State(controller): State<Arc<AudioController>>,
        Path((id, lang)): Path<(i64, String)>,
    ) -> AppResult<(StatusCode, HeaderMap, Body)> {
        let language = Self::parse_language(&lang)?;

        let served = controller.coordinator.get_or_generate(id, language).await?;

        let headers =
            Self::audio_headers(Some(&served.content_hash), Some(served.cache_hit))?;
        Ok((
            StatusCode::OK,
            headers,
            Body::from(served.bytes.as_ref().clone()),
        ))
    }

    /// GET /api/audio/last/:lang - Serve the latest artifact for a language
    pub async fn get_last(
        State(controller): State<Arc<AudioController>>,
        Path(lang): Path<String>,
    ) -> AppResult<(StatusCode, HeaderMap, Body)> {
        let language = Self::parse_language(&lang)?;

        let served = controller.coordinator.get_last(language).await?;

        let headers =
            Self::audio_headers(Some(&served.content_hash), Some(served.cache_hit))?;
        Ok((
            StatusCode::OK,
            headers,
            Body::from(served.bytes.as_ref().clone()),
        ))
    }

    /// GET /api/audio/merged - Stream the merged newscast file
    pub async fn get_merged(
        State(controller): State<Arc<AudioController>>,
    ) -> AppResult<(StatusCode, HeaderMap, Body)> {
        let merged = controller.coordinator.get_merged().await?;

        let mut headers = Self::audio_headers(merged.content_hash.as_deref(), None)?;
        if let Ok(value) = merged.size_bytes.to_string().parse() {
            headers.insert(header::CONTENT_LENGTH, value);
        }
        Ok((StatusCode::OK, headers, Body::from_stream(merged.stream)))
    }
}
