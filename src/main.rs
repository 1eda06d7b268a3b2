use std::{process, sync::Arc};

use pagepool::{
    application::error::AppError,
    application::repos::{ImagesRepo, KeywordsRepo, StatusStore, TemplatesRepo},
    batcher::{BatcherConfig, UpdateBatcher},
    classify::Classifier,
    config::{self, Command, DetectArgs, Settings},
    infra::{db::PostgresRepositories, error::InfraError, telemetry},
    pool::{ContentPool, ImagePool, KeywordPool, memory::format_bytes},
    templates::TemplateCache,
};
use tokio::time::{MissedTickBehavior, interval};
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    let chain = error.chain();
    if dispatcher::has_been_set() {
        error!(error = %error, chain = ?chain, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, chain = ?chain, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()?;

    let command = cli_args
        .command
        .unwrap_or(Command::Run(Box::<config::RunArgs>::default()));

    telemetry::init(&settings.logging)?;

    match command {
        Command::Run(_) => run_pools(settings).await,
        Command::Detect(args) => run_detect(&settings, args),
    }
}

async fn run_pools(settings: Settings) -> Result<(), AppError> {
    let repositories = init_repositories(&settings).await?;

    let keywords_repo: Arc<dyn KeywordsRepo> = repositories.clone();
    let images_repo: Arc<dyn ImagesRepo> = repositories.clone();
    let templates_repo: Arc<dyn TemplatesRepo> = repositories.clone();
    let status_store: Arc<dyn StatusStore> = repositories;

    let keywords = Arc::new(KeywordPool::new(keywords_repo));
    let images = Arc::new(ImagePool::new(images_repo));
    let templates = TemplateCache::new(templates_repo);
    let classifier = Classifier::from_settings(settings.classifier.rules_path.as_deref())?;

    let (keywords_started, images_started, templates_loaded) =
        tokio::join!(keywords.start(), images.start(), templates.load_all());
    keywords_started?;
    images_started?;
    let templates_loaded = templates_loaded?;

    info!(
        keyword_groups = keywords.group_ids().len(),
        image_groups = images.group_ids().len(),
        templates = templates_loaded,
        memory = %format_bytes(keywords.memory_bytes() + images.memory_bytes()),
        "Serving caches ready"
    );

    let batcher = UpdateBatcher::start(status_store, BatcherConfig::from(&settings.batcher));

    let mut ticker = interval(settings.pools.stats_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await;

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            biased;
            signal = &mut shutdown => {
                if let Err(err) = signal {
                    warn!(error = %err, "Failed to listen for ctrl-c; shutting down");
                }
                break;
            }
            _ = ticker.tick() => {
                log_stats(&*keywords, &*images, &templates, &classifier, &batcher).await;
            }
        }
    }

    info!("Shutdown requested");
    keywords.stop();
    images.stop();
    batcher.stop().await;
    Ok(())
}

async fn log_stats(
    keywords: &dyn ContentPool,
    images: &dyn ContentPool,
    templates: &TemplateCache,
    classifier: &Classifier,
    batcher: &UpdateBatcher,
) {
    for pool in [keywords, images] {
        let stats = pool.total_stats();
        info!(
            pool = %stats.pool,
            groups = stats.groups,
            items = stats.items,
            hits = stats.cache_hits,
            misses = stats.cache_misses,
            memory = %format_bytes(stats.memory_bytes),
            "Pool stats"
        );
    }

    let template_stats = templates.stats();
    info!(
        templates = template_stats.templates,
        names = template_stats.names,
        "Template cache stats"
    );
    info!(stats = ?classifier.stats().as_map(), "Classifier stats");
    info!(
        pending = batcher.pending_len().await,
        stats = ?batcher.stats(),
        "Update batcher stats"
    );
}

fn run_detect(settings: &Settings, args: DetectArgs) -> Result<(), AppError> {
    let classifier = Classifier::from_settings(settings.classifier.rules_path.as_deref())?;

    for input in &args.inputs {
        let result = classifier.detect(input);
        let line = serde_json::to_string(&result)
            .map_err(|err| AppError::unexpected(format!("failed to encode result: {err}")))?;
        println!("{line}");
    }
    Ok(())
}

async fn init_repositories(settings: &Settings) -> Result<Arc<PostgresRepositories>, AppError> {
    let database_url = settings
        .database
        .url
        .as_ref()
        .ok_or(InfraError::MissingDatabaseUrl)?;

    let pool = PostgresRepositories::connect(database_url, settings.database.max_connections.get())
        .await
        .map_err(InfraError::from)?;

    let repositories = PostgresRepositories::new(pool);
    repositories
        .health_check()
        .await
        .map_err(InfraError::from)?;

    Ok(Arc::new(repositories))
}
