//! Cache trigger service.
//!
//! Ties the request cache and the invalidation channel together: every
//! application event first evicts what it made stale, then tells the views
//! holding that data to re-fetch.

use reword_api_types::UserId;
use tracing::{debug, info};

use super::channel::{InvalidationChannel, InvalidationReason, InvalidationTarget};
use super::coordinator::RequestCache;
use super::keys::{self, ResourceKind};

/// Evict-then-publish entry point for write paths.
///
/// # Usage
///
/// ```ignore
/// // After a successful save:
/// trigger.content_saved(user_id);
/// ```
#[derive(Clone)]
pub struct CacheTrigger {
    cache: RequestCache,
    channel: InvalidationChannel,
}

impl CacheTrigger {
    pub fn new(cache: RequestCache, channel: InvalidationChannel) -> Self {
        Self { cache, channel }
    }

    /// Evict `target` from the cache, then publish it.
    ///
    /// Returns the number of subscribers notified.
    pub fn trigger(&self, target: InvalidationTarget, reason: InvalidationReason) -> usize {
        let evicted = match &target {
            InvalidationTarget::Key(key) => usize::from(self.cache.invalidate(key)),
            InvalidationTarget::Prefix(prefix) => self.cache.invalidate_prefix(prefix),
        };
        let notified = self.channel.publish(target, reason);
        debug!(evicted, notified, "Cache trigger applied");
        notified
    }

    fn mutated_keys<'a>(&self, targets: impl IntoIterator<Item = &'a str>) -> usize {
        targets
            .into_iter()
            .map(|key| self.trigger(InvalidationTarget::key(key), InvalidationReason::Mutated))
            .sum()
    }

    /// Saved content list changed (save, favorite, delete).
    pub fn content_saved(&self, user_id: UserId) -> usize {
        let key = keys::saved_content(user_id);
        self.mutated_keys([key.as_str()])
    }

    /// A generation finished: lists and usage counters moved.
    pub fn content_generated(&self, user_id: UserId) -> usize {
        let saved = keys::saved_content(user_id);
        let history = keys::content_history(user_id);
        let navbar = keys::usage_stats(user_id);
        let overview = keys::dashboard_usage_stats(user_id);
        self.mutated_keys([
            saved.as_str(),
            history.as_str(),
            navbar.as_str(),
            overview.as_str(),
        ])
    }

    pub fn usage_stats_updated(&self, user_id: UserId) -> usize {
        let navbar = keys::usage_stats(user_id);
        let overview = keys::dashboard_usage_stats(user_id);
        self.mutated_keys([navbar.as_str(), overview.as_str()])
    }

    /// Tier changed: limits and counters are both tier dependent.
    pub fn subscription_changed(&self, user_id: UserId) -> usize {
        let navbar = keys::usage_stats(user_id);
        let overview = keys::dashboard_usage_stats(user_id);
        let limits = keys::feature_limits(user_id);
        self.mutated_keys([navbar.as_str(), overview.as_str(), limits.as_str()])
    }

    /// Any template listing may be out of date (usage counts, new templates).
    pub fn templates_changed(&self) -> usize {
        self.trigger(
            InvalidationTarget::prefix(ResourceKind::CommunityTemplates.prefix()),
            InvalidationReason::Mutated,
        )
    }

    /// User asked to reload `key`.
    pub fn manual_refresh(&self, key: &str) -> usize {
        self.trigger(InvalidationTarget::key(key), InvalidationReason::ManualRefresh)
    }

    /// Drop everything cached for the session and tell every view.
    pub fn signed_out(&self) -> usize {
        self.cache.clear();
        let notified = self
            .channel
            .publish(InvalidationTarget::prefix(""), InvalidationReason::Mutated);
        info!(notified, "Session cache reset after sign-out");
        notified
    }

    pub fn cache(&self) -> &RequestCache {
        &self.cache
    }

    pub fn channel(&self) -> &InvalidationChannel {
        &self.channel
    }
}
