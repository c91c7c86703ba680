//! In-memory `RewordApi` used by the integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use reword_api_types::{
    CommunityTemplate, ContentHistoryEntry, ContentId, FeatureLimits, SavedContent, TemplateId,
    UsageStats,
};
use reword_sync::application::api::RewordApi;
use reword_sync::application::dashboard::DashboardService;
use reword_sync::application::retry::RetryPolicy;
use reword_sync::cache::{CacheConfig, CacheTrigger, FetchError, InvalidationChannel, RequestCache};

#[derive(Debug, Default)]
pub struct Calls {
    pub usage_stats: AtomicUsize,
    pub saved_content: AtomicUsize,
    pub content_history: AtomicUsize,
    pub community_templates: AtomicUsize,
    pub feature_limits: AtomicUsize,
    pub set_favorite: AtomicUsize,
    pub delete_saved_content: AtomicUsize,
    pub record_template_use: AtomicUsize,
}

impl Calls {
    pub fn get(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

/// Scripted backend. Every call sleeps for `latency` first so concurrent
/// loads overlap.
pub struct FakeApi {
    pub calls: Calls,
    pub latency: Duration,
    pub saved: Mutex<Vec<SavedContent>>,
    pub templates: Mutex<Vec<CommunityTemplate>>,
    pub categories_requested: Mutex<Vec<Option<String>>>,
    pub template_uses: Mutex<Vec<TemplateId>>,
    pub favorite_updates: Mutex<Vec<(ContentId, bool)>>,
    /// Failures returned, in order, by the next `usage_stats` calls.
    pub usage_failures: Mutex<Vec<FetchError>>,
    pub favorite_failure: Mutex<Option<FetchError>>,
    pub delete_failure: Mutex<Option<FetchError>>,
}

impl FakeApi {
    pub fn new() -> Self {
        Self {
            calls: Calls::default(),
            latency: Duration::from_millis(50),
            saved: Mutex::new(vec![saved(1, false), saved(2, true)]),
            templates: Mutex::new(vec![
                template(10, 3, "2024-05-01T10:00:00Z"),
                template(11, 40, "2024-04-01T10:00:00Z"),
                template(12, 7, "2024-06-01T10:00:00Z"),
            ]),
            categories_requested: Mutex::new(Vec::new()),
            template_uses: Mutex::new(Vec::new()),
            favorite_updates: Mutex::new(Vec::new()),
            usage_failures: Mutex::new(Vec::new()),
            favorite_failure: Mutex::new(None),
            delete_failure: Mutex::new(None),
        }
    }

    pub fn failing_usage(self, failures: Vec<FetchError>) -> Self {
        *self.usage_failures.lock().expect("usage failures") = failures;
        self
    }

    pub fn failing_favorite(self, failure: FetchError) -> Self {
        *self.favorite_failure.lock().expect("favorite failure") = Some(failure);
        self
    }

    pub fn failing_delete(self, failure: FetchError) -> Self {
        *self.delete_failure.lock().expect("delete failure") = Some(failure);
        self
    }

    async fn pause(&self) {
        tokio::time::sleep(self.latency).await;
    }
}

#[async_trait]
impl RewordApi for FakeApi {
    async fn usage_stats(&self) -> Result<UsageStats, FetchError> {
        self.calls.usage_stats.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        let failure = {
            let mut failures = self.usage_failures.lock().expect("usage failures");
            (!failures.is_empty()).then(|| failures.remove(0))
        };
        match failure {
            Some(err) => Err(err),
            None => Ok(usage()),
        }
    }

    async fn saved_content(&self) -> Result<Vec<SavedContent>, FetchError> {
        self.calls.saved_content.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        Ok(self.saved.lock().expect("saved").clone())
    }

    async fn content_history(&self) -> Result<Vec<ContentHistoryEntry>, FetchError> {
        self.calls.content_history.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        Ok(vec![history(100)])
    }

    async fn community_templates(
        &self,
        category: Option<&str>,
    ) -> Result<Vec<CommunityTemplate>, FetchError> {
        self.calls.community_templates.fetch_add(1, Ordering::SeqCst);
        self.categories_requested
            .lock()
            .expect("categories")
            .push(category.map(str::to_string));
        self.pause().await;
        Ok(self.templates.lock().expect("templates").clone())
    }

    async fn feature_limits(&self) -> Result<FeatureLimits, FetchError> {
        self.calls.feature_limits.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        Ok(limits())
    }

    async fn set_favorite(
        &self,
        content_id: ContentId,
        is_favorite: bool,
    ) -> Result<(), FetchError> {
        self.calls.set_favorite.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        if let Some(err) = self.favorite_failure.lock().expect("favorite failure").clone() {
            return Err(err);
        }
        self.favorite_updates
            .lock()
            .expect("favorite updates")
            .push((content_id, is_favorite));
        let mut saved = self.saved.lock().expect("saved");
        if let Some(item) = saved.iter_mut().find(|item| item.id == content_id) {
            item.is_favorite = is_favorite;
        }
        Ok(())
    }

    async fn delete_saved_content(&self, content_id: ContentId) -> Result<(), FetchError> {
        self.calls.delete_saved_content.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        if let Some(err) = self.delete_failure.lock().expect("delete failure").clone() {
            return Err(err);
        }
        self.saved
            .lock()
            .expect("saved")
            .retain(|item| item.id != content_id);
        Ok(())
    }

    async fn record_template_use(&self, template_id: TemplateId) -> Result<(), FetchError> {
        self.calls.record_template_use.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        self.template_uses
            .lock()
            .expect("template uses")
            .push(template_id);
        Ok(())
    }
}

pub fn service(api: &Arc<FakeApi>, retry: RetryPolicy) -> DashboardService {
    let cache = RequestCache::new(CacheConfig::default());
    let trigger = CacheTrigger::new(cache, InvalidationChannel::new());
    let api: Arc<dyn RewordApi> = api.clone();
    DashboardService::new(api, trigger, retry)
}

pub fn usage() -> UsageStats {
    UsageStats {
        total_generations: 12,
        recent_generations: 3,
        rate_limit: 50,
        remaining_requests: 47,
        remaining_generations: Some(38),
        is_premium: false,
        subscription_tier: Some("free".to_string()),
    }
}

pub fn saved(id: ContentId, is_favorite: bool) -> SavedContent {
    SavedContent {
        id,
        title: format!("Saved {id}"),
        content_type: "linkedin".to_string(),
        content: "Launch notes".to_string(),
        tags: None,
        is_favorite,
        created_at: "2024-05-01T10:00:00Z".to_string(),
        updated_at: None,
    }
}

pub fn history(id: ContentId) -> ContentHistoryEntry {
    ContentHistoryEntry {
        id,
        original_content: "Release announcement".to_string(),
        content_source: Some("text".to_string()),
        twitter_thread: Some("1/ We shipped".to_string()),
        linkedin_post: None,
        instagram_carousel: None,
        processing_time: Some(1.5),
        created_at: "2024-05-02T08:30:00Z".to_string(),
    }
}

pub fn template(id: TemplateId, usage_count: i64, created_at: &str) -> CommunityTemplate {
    CommunityTemplate {
        id,
        name: format!("Template {id}"),
        description: None,
        category: "linkedin".to_string(),
        content: "Share {{topic}}".to_string(),
        tags: None,
        is_public: true,
        usage_count,
        is_favorite: false,
        created_at: created_at.to_string(),
        updated_at: None,
        user_id: 9,
        is_own_template: false,
    }
}

pub fn limits() -> FeatureLimits {
    FeatureLimits {
        tier: "free".to_string(),
        can_save_content: true,
        can_process_urls: false,
        can_access_analytics: false,
        can_use_advanced_templates: false,
        can_customize_branding: false,
        generation_limit: 50,
        remaining_generations: 38,
        supported_platforms: vec!["twitter".to_string(), "linkedin".to_string()],
        export_formats: vec!["txt".to_string()],
        max_bulk_items: 1,
        max_content_length: 5000,
    }
}
