use std::{process, sync::Arc, sync::RwLock};

use clap::Parser;
use reword_sync::{
    application::{
        api::RewordApi, dashboard::DashboardService, error::AppError, retry::RetryPolicy,
    },
    cache::{CacheConfig, CacheTrigger, InvalidationChannel, RequestCache},
    config::{self, CliArgs, Command, DeleteArgs, FavoriteArgs, Settings},
    infra::{http::HttpApiClient, telemetry},
};
use serde::Serialize;
use tracing::{Dispatch, Level, debug, dispatcher, error};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let cli = CliArgs::parse();
    let settings = config::load(&cli)?;

    telemetry::init(&settings.logging)?;

    let service = build_service(&settings)?;
    match cli.command {
        Command::UsageStats(args) => print_json(&service.usage_stats(args.user_id).await?),
        Command::SavedContent(args) => print_json(&service.saved_content(args.user_id).await?),
        Command::History(args) => print_json(&service.content_history(args.user_id).await?),
        Command::FeatureLimits(args) => print_json(&service.feature_limits(args.user_id).await?),
        Command::Templates(args) => {
            print_json(&service.community_templates(&args.category, args.sort).await?)
        }
        Command::Favorite(args) => run_favorite(&service, args).await,
        Command::Delete(args) => run_delete(&service, args).await,
    }
}

fn build_service(settings: &Settings) -> Result<DashboardService, AppError> {
    let api: Arc<dyn RewordApi> = Arc::new(HttpApiClient::new(&settings.api)?);
    let cache = RequestCache::new(CacheConfig::from(&settings.cache));
    let trigger = CacheTrigger::new(cache, InvalidationChannel::new());
    Ok(DashboardService::new(
        api,
        trigger,
        RetryPolicy::from(&settings.retry),
    ))
}

async fn run_favorite(service: &DashboardService, args: FavoriteArgs) -> Result<(), AppError> {
    let user_id = args.user.user_id;
    let list = RwLock::new(service.saved_content(user_id).await?);
    let is_favorite = args.toggle.is_favorite();

    service
        .set_favorite(user_id, args.content_id, is_favorite, &list)
        .await?;

    let items = list
        .into_inner()
        .map_err(|_| AppError::unexpected("saved content list lock poisoned"))?;
    let updated = items
        .into_iter()
        .find(|item| item.id == args.content_id)
        .ok_or_else(|| AppError::unexpected("updated item vanished from the list"))?;
    debug!(stats = ?service.cache().stats(), "Cache state after favorite update");
    print_json(&updated)
}

async fn run_delete(service: &DashboardService, args: DeleteArgs) -> Result<(), AppError> {
    let user_id = args.user.user_id;
    let list = RwLock::new(service.saved_content(user_id).await?);

    service
        .delete_saved_content(user_id, args.content_id, &list)
        .await?;

    let remaining = list
        .into_inner()
        .map_err(|_| AppError::unexpected("saved content list lock poisoned"))?;
    print_json(&remaining)
}

fn print_json<T: Serialize>(value: &T) -> Result<(), AppError> {
    let rendered = serde_json::to_string_pretty(value)
        .map_err(|err| AppError::unexpected(format!("failed to render output: {err}")))?;
    println!("{rendered}");
    Ok(())
}
