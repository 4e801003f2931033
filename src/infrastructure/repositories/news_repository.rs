use crate::domain::audio::{LanguageCode, NewsItem};
use crate::infrastructure::db::DbPool;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Read-only access to news item metadata.
///
/// The audio coordinator only reads identifiers, language codes and text
/// from the relational store; it never mutates it.
#[async_trait]
pub trait NewsStore: Send + Sync {
    /// Look up a single item by id and language.
    async fn find_item(&self, id: i64, language: LanguageCode)
        -> Result<Option<NewsItem>, String>;

    /// Latest published item for a language.
    async fn latest_for_language(
        &self,
        language: LanguageCode,
    ) -> Result<Option<NewsItem>, String>;

    /// Most recent items across the feed, newest first, for the merged file.
    async fn items_for_merge(&self, limit: i64) -> Result<Vec<NewsItem>, String>;
}

/// Postgres-backed news metadata reader.
pub struct NewsRepository {
    pool: Arc<DbPool>,
}

#[derive(sqlx::FromRow)]
struct NewsItemRow {
    id: i64,
    language: String,
    title: String,
    body: String,
    published_at: DateTime<Utc>,
}

impl NewsItemRow {
    fn into_item(self) -> Result<NewsItem, String> {
        let language = self
            .language
            .parse::<LanguageCode>()
            .map_err(|e| format!("news item {} has bad language: {e}", self.id))?;
        Ok(NewsItem {
            id: self.id,
            language,
            title: self.title,
            body: self.body,
            published_at: self.published_at,
        })
    }
}

impl NewsRepository {
    pub fn new(pool: Arc<DbPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl NewsStore for NewsRepository {
    async fn find_item(
        &self,
        id: i64,
        language: LanguageCode,
    ) -> Result<Option<NewsItem>, String> {
        let pool = self.pool.as_ref();
        let row = sqlx::query_as::<_, NewsItemRow>(
            "SELECT id, language, title, body, published_at FROM news_items WHERE id = $1 AND language = $2",
        )
        .bind(id)
        .bind(language.as_str())
        .fetch_optional(pool)
        .await
        .map_err(|e| e.to_string())?;

        row.map(NewsItemRow::into_item).transpose()
    }

    async fn latest_for_language(
        &self,
        language: LanguageCode,
    ) -> Result<Option<NewsItem>, String> {
        let pool = self.pool.as_ref();
        let row = sqlx::query_as::<_, NewsItemRow>(
            "SELECT id, language, title, body, published_at FROM news_items WHERE language = $1 ORDER BY published_at DESC LIMIT 1",
        )
        .bind(language.as_str())
        .fetch_optional(pool)
        .await
        .map_err(|e| e.to_string())?;

        row.map(NewsItemRow::into_item).transpose()
    }

    async fn items_for_merge(&self, limit: i64) -> Result<Vec<NewsItem>, String> {
        let pool = self.pool.as_ref();
        let rows = sqlx::query_as::<_, NewsItemRow>(
            "SELECT id, language, title, body, published_at FROM news_items ORDER BY published_at DESC LIMIT $1",
        )
        .bind(limit)
        .fetch_all(pool)
        .await
        .map_err(|e| e.to_string())?;

        rows.into_iter().map(NewsItemRow::into_item).collect()
    }
}
