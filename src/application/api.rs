//! Reword backend API seam.
//!
//! The dashboard service only talks to the backend through [`RewordApi`];
//! `infra::http::HttpApiClient` is the production implementation. Every
//! call is scoped to the user behind the configured bearer token.

use async_trait::async_trait;
use reword_api_types::{
    CommunityTemplate, ContentHistoryEntry, ContentId, FeatureLimits, SavedContent, TemplateId,
    UsageStats,
};

use crate::cache::FetchError;

#[async_trait]
pub trait RewordApi: Send + Sync {
    async fn usage_stats(&self) -> Result<UsageStats, FetchError>;

    async fn saved_content(&self) -> Result<Vec<SavedContent>, FetchError>;

    async fn content_history(&self) -> Result<Vec<ContentHistoryEntry>, FetchError>;

    /// Public templates, optionally narrowed to one category.
    async fn community_templates(
        &self,
        category: Option<&str>,
    ) -> Result<Vec<CommunityTemplate>, FetchError>;

    async fn feature_limits(&self) -> Result<FeatureLimits, FetchError>;

    async fn set_favorite(&self, content_id: ContentId, is_favorite: bool)
    -> Result<(), FetchError>;

    async fn delete_saved_content(&self, content_id: ContentId) -> Result<(), FetchError>;

    async fn record_template_use(&self, template_id: TemplateId) -> Result<(), FetchError>;
}
