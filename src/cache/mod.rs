//! Reword client cache.
//!
//! - **Store**: keyed values with a per-entry TTL, LRU bounded
//! - **Coordinator** ([`RequestCache`]): fresh hit, joined in-flight fetch,
//!   or one new fetch per key
//! - **Channel** ([`InvalidationChannel`]): tells mounted views that the
//!   data behind a key changed
//! - **Optimistic helper** ([`run_optimistic`]): apply locally, mutate
//!   remotely, confirm or roll back
//!
//! ## Configuration
//!
//! ```toml
//! [cache]
//! volatile_ttl_secs = 300
//! list_ttl_secs = 1800
//! max_entries = 512
//! ```

mod channel;
mod config;
mod coordinator;
mod error;
pub mod keys;
mod lock;
mod optimistic;
mod store;
mod trigger;

pub use channel::{
    InvalidationChannel, InvalidationEvent, InvalidationReason, InvalidationTarget, KeyMatcher,
    Subscription,
};
pub use config::CacheConfig;
pub use coordinator::{CacheStats, RequestCache};
pub use error::{CacheError, FetchError};
pub use keys::{CacheKey, ResourceKind, TtlClass};
pub use optimistic::{
    InFlight, MutationError, MutationGate, Optimistic, SlotFn, StateSlot, run_optimistic,
};
pub use store::{CacheStore, CachedValue, Freshness};
pub use trigger::CacheTrigger;
