//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{num::NonZeroUsize, path::PathBuf, str::FromStr, time::Duration};

use clap::{Args, Parser, Subcommand, builder::BoolishValueParser};
use config::{Config, Environment, File};
use reword_api_types::{ALL_CATEGORIES, ContentId, TemplateSort, UserId};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use url::Url;

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "reword";
const ENV_PREFIX: &str = "REWORD";
const DEFAULT_API_BASE_URL: &str = "http://127.0.0.1:8000";
const DEFAULT_API_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_VOLATILE_TTL_SECS: u64 = 5 * 60;
const DEFAULT_LIST_TTL_SECS: u64 = 30 * 60;
const DEFAULT_MAX_ENTRIES: u64 = 512;
const DEFAULT_RETRY_DELAY_MS: u64 = 1_000;
const DEFAULT_RETRY_ATTEMPTS: u32 = 1;

/// Command-line arguments for the `reword-sync` binary.
#[derive(Debug, Parser)]
#[command(
    name = "reword-sync",
    version,
    about = "Cached command-line client for the Reword dashboard API"
)]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "REWORD_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(flatten)]
    pub overrides: ClientOverrides,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Show generation counters for a user.
    #[command(name = "usage-stats")]
    UsageStats(UserArgs),
    /// List saved content.
    #[command(name = "saved-content")]
    SavedContent(UserArgs),
    /// List past generations.
    #[command(name = "history")]
    History(UserArgs),
    /// Show the feature switches of the user's tier.
    #[command(name = "feature-limits")]
    FeatureLimits(UserArgs),
    /// Browse community templates.
    #[command(name = "templates")]
    Templates(TemplatesArgs),
    /// Mark or unmark a saved item as favorite.
    #[command(name = "favorite")]
    Favorite(FavoriteArgs),
    /// Delete a saved item.
    #[command(name = "delete")]
    Delete(DeleteArgs),
}

#[derive(Debug, Args, Clone)]
pub struct UserArgs {
    /// Numeric id of the signed-in user.
    #[arg(long = "user-id", env = "REWORD_USER_ID", value_name = "ID")]
    pub user_id: UserId,
}

#[derive(Debug, Args, Clone)]
pub struct TemplatesArgs {
    /// Category filter; `all` disables filtering.
    #[arg(long, default_value = ALL_CATEGORIES, value_name = "CATEGORY")]
    pub category: String,

    /// Ordering (popular|recent).
    #[arg(long, default_value = "popular", value_name = "SORT")]
    pub sort: TemplateSort,
}

#[derive(Debug, Args, Clone)]
pub struct FavoriteArgs {
    #[command(flatten)]
    pub user: UserArgs,

    /// Saved content item to update.
    #[arg(value_name = "CONTENT_ID")]
    pub content_id: ContentId,

    #[command(flatten)]
    pub toggle: FavoriteToggle,
}

#[derive(Debug, Args, Clone)]
pub struct DeleteArgs {
    #[command(flatten)]
    pub user: UserArgs,

    /// Saved content item to delete.
    #[arg(value_name = "CONTENT_ID")]
    pub content_id: ContentId,
}

#[derive(Debug, Args, Clone)]
#[group(required = true, multiple = false)]
pub struct FavoriteToggle {
    /// Mark the item as favorite.
    #[arg(long)]
    pub on: bool,

    /// Remove the favorite mark.
    #[arg(long)]
    pub off: bool,
}

impl FavoriteToggle {
    pub fn is_favorite(&self) -> bool {
        self.on && !self.off
    }
}

#[derive(Debug, Args, Default, Clone)]
pub struct ClientOverrides {
    /// Override the API base URL.
    #[arg(long = "api-base-url", value_name = "URL", global = true)]
    pub api_base_url: Option<String>,

    /// Override the bearer token sent with every request.
    #[arg(long = "api-token", env = "REWORD_API_TOKEN", value_name = "TOKEN", global = true)]
    pub api_token: Option<String>,

    /// Override the per-request timeout.
    #[arg(long = "api-timeout-ms", value_name = "MILLIS", global = true)]
    pub api_timeout_ms: Option<u64>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL", global = true)]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new(),
        global = true
    )]
    pub log_json: Option<bool>,
}

/// Fully-resolved settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub api: ApiSettings,
    pub cache: CacheSettings,
    pub retry: RetrySettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone)]
pub struct ApiSettings {
    pub base_url: Url,
    pub timeout: Duration,
    pub token: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub volatile_ttl: Duration,
    pub list_ttl: Duration,
    pub max_entries: NonZeroUsize,
}

/// Call-site retry policy for cached loads.
#[derive(Debug, Clone)]
pub struct RetrySettings {
    /// Extra attempts after the first failure.
    pub attempts: u32,
    pub delay: Duration,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;
    raw.apply_client_overrides(&cli.overrides);
    Settings::from_raw(raw)
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    api: RawApiSettings,
    cache: RawCacheSettings,
    retry: RawRetrySettings,
    logging: RawLoggingSettings,
}

impl RawSettings {
    fn apply_client_overrides(&mut self, overrides: &ClientOverrides) {
        if let Some(url) = overrides.api_base_url.as_ref() {
            self.api.base_url = Some(url.clone());
        }
        if let Some(token) = overrides.api_token.as_ref() {
            self.api.token = Some(token.clone());
        }
        if let Some(timeout) = overrides.api_timeout_ms {
            self.api.timeout_ms = Some(timeout);
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            api,
            cache,
            retry,
            logging,
        } = raw;

        Ok(Self {
            api: build_api_settings(api)?,
            cache: build_cache_settings(cache)?,
            retry: build_retry_settings(retry),
            logging: build_logging_settings(logging)?,
        })
    }
}

fn build_api_settings(api: RawApiSettings) -> Result<ApiSettings, LoadError> {
    let raw_url = api
        .base_url
        .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string());
    let base_url = Url::parse(raw_url.trim())
        .map_err(|err| LoadError::invalid("api.base_url", format!("failed to parse: {err}")))?;
    if !matches!(base_url.scheme(), "http" | "https") {
        return Err(LoadError::invalid(
            "api.base_url",
            "scheme must be http or https",
        ));
    }

    let timeout_ms = api.timeout_ms.unwrap_or(DEFAULT_API_TIMEOUT_MS);
    if timeout_ms == 0 {
        return Err(LoadError::invalid(
            "api.timeout_ms",
            "must be greater than zero",
        ));
    }

    let token = api.token.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    });

    Ok(ApiSettings {
        base_url,
        timeout: Duration::from_millis(timeout_ms),
        token,
    })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let volatile_secs = cache.volatile_ttl_secs.unwrap_or(DEFAULT_VOLATILE_TTL_SECS);
    let list_secs = cache.list_ttl_secs.unwrap_or(DEFAULT_LIST_TTL_SECS);
    let max_entries = cache.max_entries.unwrap_or(DEFAULT_MAX_ENTRIES);

    Ok(CacheSettings {
        volatile_ttl: non_zero_secs(volatile_secs, "cache.volatile_ttl_secs")?,
        list_ttl: non_zero_secs(list_secs, "cache.list_ttl_secs")?,
        max_entries: non_zero_usize(max_entries, "cache.max_entries")?,
    })
}

fn build_retry_settings(retry: RawRetrySettings) -> RetrySettings {
    RetrySettings {
        attempts: retry.attempts.unwrap_or(DEFAULT_RETRY_ATTEMPTS),
        delay: Duration::from_millis(retry.delay_ms.unwrap_or(DEFAULT_RETRY_DELAY_MS)),
    }
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn non_zero_secs(value: u64, key: &'static str) -> Result<Duration, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    Ok(Duration::from_secs(value))
}

fn non_zero_usize(value: u64, key: &'static str) -> Result<NonZeroUsize, LoadError> {
    let value = usize::try_from(value)
        .map_err(|_| LoadError::invalid(key, "value exceeds supported range for usize"))?;
    NonZeroUsize::new(value).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawApiSettings {
    base_url: Option<String>,
    timeout_ms: Option<u64>,
    token: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    volatile_ttl_secs: Option<u64>,
    list_ttl_secs: Option<u64>,
    max_entries: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawRetrySettings {
    attempts: Option<u32>,
    delay_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}
