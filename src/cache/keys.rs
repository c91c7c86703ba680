//! Cache key builders.
//!
//! Every cached resource gets one builder returning a [`CacheKey<T>`]. The
//! string form is `"<resource-name>-<scope-qualifier>"`, so everything for a
//! resource can be dropped by prefix, and `T` pins the value type the key
//! is read and written as.

use std::fmt;
use std::marker::PhantomData;

use reword_api_types::{
    CommunityTemplate, ContentHistoryEntry, FeatureLimits, SavedContent, TemplateSort,
    UsageStats, UserId,
};

/// How long a resource stays fresh; resolved to a duration by `CacheConfig`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TtlClass {
    /// Counters and listings that move on every generation.
    Volatile,
    /// Per-user lists that change only on explicit writes.
    List,
}

/// Cached resource families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    /// Navbar usage counters.
    UsageStats,
    /// Usage counters shown on the dashboard overview.
    DashboardUsageStats,
    /// The user's saved content list.
    SavedContent,
    /// The user's generation history.
    ContentHistory,
    /// Public templates, per category and sort order.
    CommunityTemplates,
    /// Tier feature switches.
    FeatureLimits,
}

impl ResourceKind {
    pub const fn name(self) -> &'static str {
        match self {
            Self::UsageStats => "usage-stats",
            Self::DashboardUsageStats => "dashboard-usage-stats",
            Self::SavedContent => "dashboard-saved-content",
            Self::ContentHistory => "dashboard-content-history",
            Self::CommunityTemplates => "community-templates",
            Self::FeatureLimits => "feature-limits",
        }
    }

    /// Prefix shared by every key of this resource.
    pub fn prefix(self) -> String {
        format!("{}-", self.name())
    }

    pub const fn ttl_class(self) -> TtlClass {
        match self {
            Self::SavedContent | Self::ContentHistory => TtlClass::List,
            Self::UsageStats
            | Self::DashboardUsageStats
            | Self::CommunityTemplates
            | Self::FeatureLimits => TtlClass::Volatile,
        }
    }
}

/// A cache key bound to the type of value stored under it.
pub struct CacheKey<T> {
    kind: ResourceKind,
    key: String,
    _value: PhantomData<fn() -> T>,
}

impl<T> CacheKey<T> {
    fn new(kind: ResourceKind, scope: impl fmt::Display) -> Self {
        Self {
            kind,
            key: format!("{}-{}", kind.name(), scope),
            _value: PhantomData,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.key
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    pub fn ttl_class(&self) -> TtlClass {
        self.kind.ttl_class()
    }

    pub fn into_string(self) -> String {
        self.key
    }
}

impl<T> Clone for CacheKey<T> {
    fn clone(&self) -> Self {
        Self {
            kind: self.kind,
            key: self.key.clone(),
            _value: PhantomData,
        }
    }
}

impl<T> PartialEq for CacheKey<T> {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl<T> Eq for CacheKey<T> {}

impl<T> fmt::Debug for CacheKey<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CacheKey").field(&self.key).finish()
    }
}

impl<T> fmt::Display for CacheKey<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key)
    }
}

impl<T> AsRef<str> for CacheKey<T> {
    fn as_ref(&self) -> &str {
        &self.key
    }
}

pub fn usage_stats(user_id: UserId) -> CacheKey<UsageStats> {
    CacheKey::new(ResourceKind::UsageStats, user_id)
}

pub fn dashboard_usage_stats(user_id: UserId) -> CacheKey<UsageStats> {
    CacheKey::new(ResourceKind::DashboardUsageStats, user_id)
}

pub fn saved_content(user_id: UserId) -> CacheKey<Vec<SavedContent>> {
    CacheKey::new(ResourceKind::SavedContent, user_id)
}

pub fn content_history(user_id: UserId) -> CacheKey<Vec<ContentHistoryEntry>> {
    CacheKey::new(ResourceKind::ContentHistory, user_id)
}

pub fn community_templates(category: &str, sort: TemplateSort) -> CacheKey<Vec<CommunityTemplate>> {
    CacheKey::new(
        ResourceKind::CommunityTemplates,
        format_args!("{category}-{sort}"),
    )
}

pub fn feature_limits(user_id: UserId) -> CacheKey<FeatureLimits> {
    CacheKey::new(ResourceKind::FeatureLimits, user_id)
}
