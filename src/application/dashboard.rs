//! Dashboard data service.
//!
//! Every dashboard section loads through here: the request cache with the
//! resource's TTL, the retry policy around it, and the cache trigger after
//! writes so other mounted sections re-fetch.

use std::cmp::Reverse;
use std::future::Future;
use std::sync::Arc;

use reword_api_types::{
    ALL_CATEGORIES, CommunityTemplate, ContentHistoryEntry, ContentId, FeatureLimits,
    SavedContent, TemplateId, TemplateSort, UsageStats, UserId,
};
use time::format_description::well_known::{Iso8601, Rfc3339};
use time::{OffsetDateTime, PrimitiveDateTime};
use tracing::{info, instrument};

use crate::cache::{
    CacheError, CacheKey, CacheTrigger, FetchError, MutationGate, RequestCache, SlotFn, StateSlot,
    keys, run_optimistic,
};

use super::api::RewordApi;
use super::error::ServiceError;
use super::retry::RetryPolicy;

#[derive(Clone)]
pub struct DashboardService {
    api: Arc<dyn RewordApi>,
    cache: RequestCache,
    trigger: CacheTrigger,
    retry: RetryPolicy,
    favorites: MutationGate,
}

impl DashboardService {
    pub fn new(api: Arc<dyn RewordApi>, trigger: CacheTrigger, retry: RetryPolicy) -> Self {
        Self {
            api,
            cache: trigger.cache().clone(),
            trigger,
            retry,
            favorites: MutationGate::new(),
        }
    }

    pub fn cache(&self) -> &RequestCache {
        &self.cache
    }

    pub fn trigger(&self) -> &CacheTrigger {
        &self.trigger
    }

    /// Navbar usage counters.
    pub async fn usage_stats(&self, user_id: UserId) -> Result<UsageStats, ServiceError> {
        let stats = self
            .load(keys::usage_stats(user_id), |api| async move {
                api.usage_stats().await
            })
            .await?;
        Ok(stats)
    }

    /// Usage counters for the dashboard overview, cached separately from the navbar.
    pub async fn dashboard_usage_stats(&self, user_id: UserId) -> Result<UsageStats, ServiceError> {
        let stats = self
            .load(keys::dashboard_usage_stats(user_id), |api| async move {
                api.usage_stats().await
            })
            .await?;
        Ok(stats)
    }

    pub async fn saved_content(&self, user_id: UserId) -> Result<Vec<SavedContent>, ServiceError> {
        let items = self
            .load(keys::saved_content(user_id), |api| async move {
                api.saved_content().await
            })
            .await?;
        Ok(items)
    }

    pub async fn content_history(
        &self,
        user_id: UserId,
    ) -> Result<Vec<ContentHistoryEntry>, ServiceError> {
        let entries = self
            .load(keys::content_history(user_id), |api| async move {
                api.content_history().await
            })
            .await?;
        Ok(entries)
    }

    pub async fn feature_limits(&self, user_id: UserId) -> Result<FeatureLimits, ServiceError> {
        let limits = self
            .load(keys::feature_limits(user_id), |api| async move {
                api.feature_limits().await
            })
            .await?;
        Ok(limits)
    }

    /// Community templates for `category` (or every category for `all`),
    /// ordered by `sort`. Each category and order is cached on its own key.
    pub async fn community_templates(
        &self,
        category: &str,
        sort: TemplateSort,
    ) -> Result<Vec<CommunityTemplate>, ServiceError> {
        let filter = (category != ALL_CATEGORIES).then(|| category.to_string());
        let templates = self
            .load(keys::community_templates(category, sort), move |api| {
                let filter = filter.clone();
                async move {
                    let templates = api.community_templates(filter.as_deref()).await?;
                    Ok::<_, FetchError>(sort_templates(templates, sort))
                }
            })
            .await?;
        Ok(templates)
    }

    /// Flip the favorite flag of one saved item in `list`.
    ///
    /// The flag changes in `list` right away; it goes back if the backend
    /// refuses. Returns the new flag.
    pub async fn toggle_favorite<S>(
        &self,
        user_id: UserId,
        content_id: ContentId,
        list: &S,
    ) -> Result<bool, ServiceError>
    where
        S: StateSlot<Vec<SavedContent>>,
    {
        self.change_favorite(user_id, content_id, list, |current| !current)
            .await
    }

    /// Set the favorite flag of one saved item in `list` to `is_favorite`.
    pub async fn set_favorite<S>(
        &self,
        user_id: UserId,
        content_id: ContentId,
        is_favorite: bool,
        list: &S,
    ) -> Result<bool, ServiceError>
    where
        S: StateSlot<Vec<SavedContent>>,
    {
        self.change_favorite(user_id, content_id, list, move |_| is_favorite)
            .await
    }

    #[instrument(skip(self, list, next))]
    async fn change_favorite<S, N>(
        &self,
        user_id: UserId,
        content_id: ContentId,
        list: &S,
        next: N,
    ) -> Result<bool, ServiceError>
    where
        S: StateSlot<Vec<SavedContent>>,
        N: FnOnce(&bool) -> bool,
    {
        if !list.load().iter().any(|item| item.id == content_id) {
            return Err(ServiceError::UnknownContent(content_id));
        }

        let flag = SlotFn::new(
            || {
                list.load()
                    .iter()
                    .find(|item| item.id == content_id)
                    .is_some_and(|item| item.is_favorite)
            },
            |value: bool| {
                let mut items = list.load();
                if let Some(item) = items.iter_mut().find(|item| item.id == content_id) {
                    item.is_favorite = value;
                }
                list.store(items);
            },
        );

        let item = format!("{}#{content_id}", keys::saved_content(user_id));
        let api = Arc::clone(&self.api);
        let applied = run_optimistic(&self.favorites, item, &flag, next, |applied| async move {
            api.set_favorite(content_id, applied).await?;
            Ok::<_, FetchError>(applied)
        })
        .await?;

        self.trigger.content_saved(user_id);
        info!(user_id, content_id, is_favorite = applied, "Favorite updated");
        Ok(applied)
    }

    /// Delete one saved item. `list` loses the item only once the backend
    /// confirms, so a refused delete leaves it untouched.
    #[instrument(skip(self, list))]
    pub async fn delete_saved_content<S>(
        &self,
        user_id: UserId,
        content_id: ContentId,
        list: &S,
    ) -> Result<(), ServiceError>
    where
        S: StateSlot<Vec<SavedContent>>,
    {
        if !list.load().iter().any(|item| item.id == content_id) {
            return Err(ServiceError::UnknownContent(content_id));
        }

        self.api.delete_saved_content(content_id).await?;

        let mut items = list.load();
        items.retain(|item| item.id != content_id);
        list.store(items);

        self.trigger.content_saved(user_id);
        info!(user_id, content_id, "Saved content deleted");
        Ok(())
    }

    /// Record that a template was used; every template listing is refreshed
    /// since usage counts drive the popular ordering.
    pub async fn use_template(&self, template_id: TemplateId) -> Result<(), ServiceError> {
        self.api.record_template_use(template_id).await?;
        self.trigger.templates_changed();
        Ok(())
    }

    /// Invalidate what a finished generation changed and reload the lists.
    pub async fn refresh_after_generation(
        &self,
        user_id: UserId,
    ) -> Result<(Vec<ContentHistoryEntry>, Vec<SavedContent>), ServiceError> {
        self.trigger.content_generated(user_id);
        tokio::try_join!(self.content_history(user_id), self.saved_content(user_id))
    }

    async fn load<T, F, Fut>(&self, key: CacheKey<T>, fetch: F) -> Result<T, CacheError>
    where
        T: Clone + Send + Sync + 'static,
        F: Fn(Arc<dyn RewordApi>) -> Fut + Clone + Send + 'static,
        Fut: Future<Output = Result<T, FetchError>> + Send + 'static,
    {
        let cache = &self.cache;
        let api = &self.api;
        let key = &key;
        self.retry
            .run(key.as_str(), move || {
                let api = Arc::clone(api);
                let fetch = fetch.clone();
                cache.get_keyed(key, move || fetch(api))
            })
            .await
    }
}

/// Popular: most used first. Recent: newest `created_at` first, with
/// unparseable timestamps last.
pub fn sort_templates(
    mut templates: Vec<CommunityTemplate>,
    sort: TemplateSort,
) -> Vec<CommunityTemplate> {
    match sort {
        TemplateSort::Popular => templates.sort_by_key(|template| Reverse(template.usage_count)),
        TemplateSort::Recent => templates.sort_by_cached_key(|template| {
            Reverse((
                parse_created_at(&template.created_at),
                template.created_at.clone(),
            ))
        }),
    }
    templates
}

fn parse_created_at(raw: &str) -> Option<OffsetDateTime> {
    OffsetDateTime::parse(raw, &Rfc3339).ok().or_else(|| {
        PrimitiveDateTime::parse(raw, &Iso8601::DEFAULT)
            .ok()
            .map(PrimitiveDateTime::assume_utc)
    })
}
