//! Invalidation notifications between independently mounted views.
//!
//! A view that holds data for a key subscribes here; whoever changes that
//! data publishes. Publishing is synchronous: every matching handler has
//! run by the time `publish` returns. Handlers are called without the
//! subscriber table locked, so they may subscribe or unsubscribe.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, Weak};

use metrics::counter;
use time::OffsetDateTime;
use tracing::{debug, info};
use uuid::Uuid;

use super::lock::RwLockExt;

const METRIC_INVALIDATION_PUBLISHED: &str = "reword_invalidation_published_total";

/// What an invalidation covers.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum InvalidationTarget {
    /// Exactly one cache key.
    Key(String),
    /// Every key starting with the prefix. The empty prefix covers everything.
    Prefix(String),
}

impl InvalidationTarget {
    pub fn key(key: impl Into<String>) -> Self {
        Self::Key(key.into())
    }

    pub fn prefix(prefix: impl Into<String>) -> Self {
        Self::Prefix(prefix.into())
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Key(value) | Self::Prefix(value) => value,
        }
    }
}

impl fmt::Display for InvalidationTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Key(key) => write!(f, "key:{key}"),
            Self::Prefix(prefix) => write!(f, "prefix:{prefix}*"),
        }
    }
}

/// Why data was invalidated. Informational only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InvalidationReason {
    Mutated,
    ManualRefresh,
    TtlExpired,
}

impl InvalidationReason {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Mutated => "mutated",
            Self::ManualRefresh => "manual_refresh",
            Self::TtlExpired => "ttl_expired",
        }
    }
}

/// A published invalidation, as seen by handlers.
#[derive(Debug, Clone)]
pub struct InvalidationEvent {
    /// Unique identifier for log correlation (UUIDv4).
    pub id: Uuid,
    /// Position of this event in the channel's publish order.
    pub epoch: u64,
    pub target: InvalidationTarget,
    pub reason: InvalidationReason,
    pub issued_at: OffsetDateTime,
}

impl InvalidationEvent {
    /// The key or prefix that was invalidated.
    pub fn key(&self) -> &str {
        self.target.as_str()
    }
}

type Predicate = Arc<dyn Fn(&str) -> bool + Send + Sync>;
type Handler = Arc<dyn Fn(&InvalidationEvent) + Send + Sync>;

/// Which publications a subscriber wants to hear about.
#[derive(Clone)]
pub enum KeyMatcher {
    Exact(String),
    Prefix(String),
    /// Called with the published key, or with the prefix for prefix publications.
    Predicate(Predicate),
}

impl KeyMatcher {
    pub fn exact(key: impl Into<String>) -> Self {
        Self::Exact(key.into())
    }

    pub fn prefix(prefix: impl Into<String>) -> Self {
        Self::Prefix(prefix.into())
    }

    pub fn predicate<P>(predicate: P) -> Self
    where
        P: Fn(&str) -> bool + Send + Sync + 'static,
    {
        Self::Predicate(Arc::new(predicate))
    }

    pub fn matches(&self, target: &InvalidationTarget) -> bool {
        match (self, target) {
            (Self::Exact(own), InvalidationTarget::Key(key)) => own == key,
            (Self::Exact(own), InvalidationTarget::Prefix(prefix)) => own.starts_with(prefix.as_str()),
            (Self::Prefix(own), InvalidationTarget::Key(key)) => key.starts_with(own.as_str()),
            (Self::Prefix(own), InvalidationTarget::Prefix(prefix)) => {
                own.starts_with(prefix.as_str()) || prefix.starts_with(own.as_str())
            }
            (Self::Predicate(predicate), target) => predicate(target.as_str()),
        }
    }
}

impl fmt::Debug for KeyMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact(key) => f.debug_tuple("Exact").field(key).finish(),
            Self::Prefix(prefix) => f.debug_tuple("Prefix").field(prefix).finish(),
            Self::Predicate(_) => f.write_str("Predicate(..)"),
        }
    }
}

struct Subscriber {
    matcher: KeyMatcher,
    handler: Handler,
}

struct ChannelInner {
    subscribers: RwLock<BTreeMap<u64, Subscriber>>,
    next_subscriber_id: AtomicU64,
    epoch: AtomicU64,
}

impl ChannelInner {
    fn remove(&self, id: u64) -> bool {
        self.subscribers
            .write_recovered("channel.unsubscribe")
            .remove(&id)
            .is_some()
    }
}

/// Publish/subscribe hub for "the data behind this key changed".
///
/// Construct one per client session and share it by cloning.
#[derive(Clone)]
pub struct InvalidationChannel {
    inner: Arc<ChannelInner>,
}

impl Default for InvalidationChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl InvalidationChannel {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(ChannelInner {
                subscribers: RwLock::new(BTreeMap::new()),
                next_subscriber_id: AtomicU64::new(1),
                epoch: AtomicU64::new(0),
            }),
        }
    }

    /// Notify every subscriber whose matcher accepts `target`.
    ///
    /// Returns the number of handlers invoked. Handlers run in subscription
    /// order.
    pub fn publish(&self, target: InvalidationTarget, reason: InvalidationReason) -> usize {
        let event = InvalidationEvent {
            id: Uuid::new_v4(),
            epoch: self.inner.epoch.fetch_add(1, Ordering::SeqCst),
            target,
            reason,
            issued_at: OffsetDateTime::now_utc(),
        };

        let handlers: Vec<Handler> = self
            .inner
            .subscribers
            .read_recovered("channel.publish")
            .values()
            .filter(|subscriber| subscriber.matcher.matches(&event.target))
            .map(|subscriber| Arc::clone(&subscriber.handler))
            .collect();

        info!(
            event_id = %event.id,
            event_epoch = event.epoch,
            target = %event.target,
            reason = event.reason.as_str(),
            notified = handlers.len(),
            "Invalidation published"
        );
        counter!(METRIC_INVALIDATION_PUBLISHED, "reason" => event.reason.as_str()).increment(1);

        for handler in &handlers {
            handler(&event);
        }
        handlers.len()
    }

    /// Register `handler` for publications accepted by `matcher`.
    ///
    /// The handler stays registered until the returned guard is dropped or
    /// [`Subscription::unsubscribe`] is called.
    pub fn subscribe<H>(&self, matcher: KeyMatcher, handler: H) -> Subscription
    where
        H: Fn(&InvalidationEvent) + Send + Sync + 'static,
    {
        let id = self.inner.next_subscriber_id.fetch_add(1, Ordering::Relaxed);
        debug!(subscriber_id = id, matcher = ?matcher, "Invalidation subscriber added");

        self.inner.subscribers.write_recovered("channel.subscribe").insert(
            id,
            Subscriber {
                matcher,
                handler: Arc::new(handler),
            },
        );

        Subscription {
            id,
            channel: Arc::downgrade(&self.inner),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner
            .subscribers
            .read_recovered("channel.subscriber_count")
            .len()
    }
}

/// Registration handle returned by [`InvalidationChannel::subscribe`].
#[must_use = "dropping a Subscription unsubscribes its handler"]
pub struct Subscription {
    id: u64,
    channel: Weak<ChannelInner>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(channel) = self.channel.upgrade()
            && channel.remove(self.id)
        {
            debug!(subscriber_id = self.id, "Invalidation subscriber removed");
        }
    }
}
