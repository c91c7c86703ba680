//! Logging and metric descriptions for the `reword-sync` process.
//!
//! Logs go to stderr: stdout carries the JSON the subcommands print.

use std::io;
use std::sync::Once;

use metrics::{Unit, describe_counter, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install the global subscriber. Fails if one is already installed.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .with_writer(io::stderr)
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .compact()
            .with_target(true)
            .with_writer(io::stderr)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(ErrorLayer::default())
        .with(fmt_layer)
        .try_init()
        .map_err(|err| {
            InfraError::telemetry(format!("failed to install tracing subscriber: {err}"))
        })
}

fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "reword_cache_hit_total",
            Unit::Count,
            "Total number of fresh request-cache hits."
        );
        describe_counter!(
            "reword_cache_miss_total",
            Unit::Count,
            "Total number of request-cache misses, including expired entries."
        );
        describe_counter!(
            "reword_cache_evict_total",
            Unit::Count,
            "Total number of request-cache evictions by cause (capacity or expired)."
        );
        describe_counter!(
            "reword_cache_coalesced_total",
            Unit::Count,
            "Total number of loads that joined an in-flight fetch for the same key."
        );
        describe_counter!(
            "reword_cache_fetch_error_total",
            Unit::Count,
            "Total number of backend fetches that failed."
        );
        describe_histogram!(
            "reword_cache_fetch_ms",
            Unit::Milliseconds,
            "Backend fetch latency in milliseconds."
        );
        describe_counter!(
            "reword_invalidation_published_total",
            Unit::Count,
            "Total number of invalidation events published by reason."
        );
    });
}
