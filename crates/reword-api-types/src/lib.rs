//! Request and response types for the Reword dashboard HTTP API.
//!
//! Field names follow the JSON emitted by the backend, so these types
//! deserialize the responses directly.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Numeric user identifier assigned by the backend.
pub type UserId = i64;
/// Identifier of a saved content item.
pub type ContentId = i64;
/// Identifier of a community template.
pub type TemplateId = i64;

/// Category value that disables the template category filter.
pub const ALL_CATEGORIES: &str = "all";

/// Generation counters shown in the navbar and the dashboard overview.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageStats {
    pub total_generations: i64,
    pub recent_generations: i64,
    /// `-1` means unlimited.
    pub rate_limit: i64,
    /// `-1` means unlimited.
    pub remaining_requests: i64,
    #[serde(default)]
    pub remaining_generations: Option<i64>,
    pub is_premium: bool,
    #[serde(default)]
    pub subscription_tier: Option<String>,
}

/// A piece of generated content the user chose to keep.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedContent {
    pub id: ContentId,
    pub title: String,
    pub content_type: String,
    pub content: String,
    #[serde(default)]
    pub tags: Option<String>,
    pub is_favorite: bool,
    pub created_at: String,
    #[serde(default)]
    pub updated_at: Option<String>,
}

/// One past generation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentHistoryEntry {
    pub id: ContentId,
    pub original_content: String,
    #[serde(default)]
    pub content_source: Option<String>,
    #[serde(default)]
    pub twitter_thread: Option<String>,
    #[serde(default)]
    pub linkedin_post: Option<String>,
    #[serde(default)]
    pub instagram_carousel: Option<String>,
    #[serde(default)]
    pub processing_time: Option<f64>,
    pub created_at: String,
}

/// A template published to the community browser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommunityTemplate {
    pub id: TemplateId,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub category: String,
    pub content: String,
    #[serde(default)]
    pub tags: Option<String>,
    pub is_public: bool,
    pub usage_count: i64,
    pub is_favorite: bool,
    pub created_at: String,
    #[serde(default)]
    pub updated_at: Option<String>,
    pub user_id: UserId,
    pub is_own_template: bool,
}

/// Per-tier feature switches used to gate dashboard actions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureLimits {
    pub tier: String,
    pub can_save_content: bool,
    pub can_process_urls: bool,
    pub can_access_analytics: bool,
    pub can_use_advanced_templates: bool,
    pub can_customize_branding: bool,
    pub generation_limit: i64,
    pub remaining_generations: i64,
    #[serde(default)]
    pub supported_platforms: Vec<String>,
    #[serde(default)]
    pub export_formats: Vec<String>,
    pub max_bulk_items: i64,
    pub max_content_length: i64,
}

/// Body of `PUT /api/v1/content/saved/{id}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FavoriteUpdate {
    pub is_favorite: bool,
}

/// Ordering of the community template browser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TemplateSort {
    /// Most used first.
    #[default]
    Popular,
    /// Newest first.
    Recent,
}

impl TemplateSort {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Popular => "popular",
            Self::Recent => "recent",
        }
    }
}

impl fmt::Display for TemplateSort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownTemplateSort(pub String);

impl fmt::Display for UnknownTemplateSort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown template sort `{}` (expected popular|recent)", self.0)
    }
}

impl std::error::Error for UnknownTemplateSort {}

impl FromStr for TemplateSort {
    type Err = UnknownTemplateSort;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "popular" => Ok(Self::Popular),
            "recent" => Ok(Self::Recent),
            other => Err(UnknownTemplateSort(other.to_string())),
        }
    }
}
