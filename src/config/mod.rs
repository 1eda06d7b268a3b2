//! Configuration layer: typed settings with layered precedence (file → env → CLI).

mod cli;

use std::{
    collections::BTreeSet,
    num::{NonZeroU32, NonZeroUsize},
    path::PathBuf,
    str::FromStr,
    time::Duration,
};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

pub use self::cli::{ClassifierOverride, CliArgs, Command, DetectArgs, RunArgs, RunOverrides};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "pagepool";
const ENV_PREFIX: &str = "PAGEPOOL";
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 8;
const DEFAULT_POOL_SIZE: u64 = 1_000;
const DEFAULT_POOL_WORKERS: u64 = 4;
const DEFAULT_POOL_REFILL_INTERVAL_MS: u64 = 1_000;
const DEFAULT_POOL_REFILL_THRESHOLD: f64 = 0.2;
const DEFAULT_BATCHER_MAX_BATCH: u64 = 100;
const DEFAULT_BATCHER_FLUSH_INTERVAL_MS: u64 = 1_000;
const DEFAULT_BATCHER_TABLES: [&str; 4] = ["titles", "contents", "keywords", "images"];
const DEFAULT_STATS_INTERVAL_SECS: u64 = 60;

/// Fully-resolved settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub logging: LoggingSettings,
    pub database: DatabaseSettings,
    pub pools: PoolSettings,
    pub batcher: BatcherSettings,
    pub classifier: ClassifierSettings,
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

#[derive(Debug, Clone)]
pub struct DatabaseSettings {
    pub url: Option<String>,
    pub max_connections: NonZeroU32,
}

/// Pool sizing. Only the consumable pools use these; reusable pools are
/// sized by the stored content itself.
#[derive(Debug, Clone)]
pub struct PoolSettings {
    pub size: NonZeroUsize,
    pub workers: NonZeroUsize,
    pub refill_interval: Duration,
    /// Fraction of `size` below which a consumable pool refills, in `(0, 1]`.
    pub refill_threshold: f64,
    pub stats_interval: Duration,
}

#[derive(Debug, Clone)]
pub struct BatcherSettings {
    pub max_batch: NonZeroUsize,
    pub flush_interval: Duration,
    pub tables: BTreeSet<String>,
}

#[derive(Debug, Clone)]
pub struct ClassifierSettings {
    pub rules_path: Option<PathBuf>,
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

    match cli.command.as_ref() {
        Some(Command::Run(args)) => raw.apply_run_overrides(&args.overrides),
        Some(Command::Detect(args)) => raw.apply_classifier_override(&args.classifier),
        None => raw.apply_run_overrides(&RunOverrides::default()),
    }

    Settings::from_raw(raw)
}

/// Resolve configuration using the process arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    logging: RawLoggingSettings,
    database: RawDatabaseSettings,
    pools: RawPoolSettings,
    batcher: RawBatcherSettings,
    classifier: RawClassifierSettings,
}

impl RawSettings {
    fn apply_run_overrides(&mut self, overrides: &RunOverrides) {
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(url) = overrides.database_url.as_ref() {
            self.database.url = Some(url.clone());
        }
        if let Some(max) = overrides.database_max_connections {
            self.database.max_connections = Some(max);
        }
        if let Some(max) = overrides.batcher_max_batch {
            self.batcher.max_batch = Some(max);
        }
        if let Some(interval) = overrides.batcher_flush_interval_ms {
            self.batcher.flush_interval_ms = Some(interval);
        }
        if let Some(seconds) = overrides.stats_interval_seconds {
            self.pools.stats_interval_seconds = Some(seconds);
        }

        self.apply_classifier_override(&overrides.classifier);
    }

    fn apply_classifier_override(&mut self, overrides: &ClassifierOverride) {
        if let Some(path) = overrides.rules_path.as_ref() {
            self.classifier.rules_path = Some(path.clone());
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            logging,
            database,
            pools,
            batcher,
            classifier,
        } = raw;

        Ok(Self {
            logging: build_logging_settings(logging)?,
            database: build_database_settings(database)?,
            pools: build_pool_settings(pools)?,
            batcher: build_batcher_settings(batcher)?,
            classifier: build_classifier_settings(classifier)?,
        })
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

fn build_database_settings(database: RawDatabaseSettings) -> Result<DatabaseSettings, LoadError> {
    let url = database.url.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    });

    let max = database
        .max_connections
        .unwrap_or(DEFAULT_DB_MAX_CONNECTIONS);
    let max_connections = NonZeroU32::new(max)
        .ok_or_else(|| LoadError::invalid("database.max_connections", "must be greater than zero"))?;

    Ok(DatabaseSettings {
        url,
        max_connections,
    })
}

fn build_pool_settings(pools: RawPoolSettings) -> Result<PoolSettings, LoadError> {
    let size = non_zero_usize(pools.size.unwrap_or(DEFAULT_POOL_SIZE), "pools.size")?;
    let workers = non_zero_usize(
        pools.workers.unwrap_or(DEFAULT_POOL_WORKERS),
        "pools.workers",
    )?;

    let refill_ms = pools
        .refill_interval_ms
        .unwrap_or(DEFAULT_POOL_REFILL_INTERVAL_MS);
    if refill_ms == 0 {
        return Err(LoadError::invalid(
            "pools.refill_interval_ms",
            "must be greater than zero",
        ));
    }

    let refill_threshold = pools
        .refill_threshold
        .unwrap_or(DEFAULT_POOL_REFILL_THRESHOLD);
    if !(refill_threshold > 0.0 && refill_threshold <= 1.0) {
        return Err(LoadError::invalid(
            "pools.refill_threshold",
            format!("must be within (0, 1], got {refill_threshold}"),
        ));
    }

    let stats_secs = pools
        .stats_interval_seconds
        .unwrap_or(DEFAULT_STATS_INTERVAL_SECS);
    if stats_secs == 0 {
        return Err(LoadError::invalid(
            "pools.stats_interval_seconds",
            "must be greater than zero",
        ));
    }

    Ok(PoolSettings {
        size,
        workers,
        refill_interval: Duration::from_millis(refill_ms),
        refill_threshold,
        stats_interval: Duration::from_secs(stats_secs),
    })
}

fn build_batcher_settings(batcher: RawBatcherSettings) -> Result<BatcherSettings, LoadError> {
    let max_batch = non_zero_usize(
        batcher.max_batch.unwrap_or(DEFAULT_BATCHER_MAX_BATCH),
        "batcher.max_batch",
    )?;

    let flush_ms = batcher
        .flush_interval_ms
        .unwrap_or(DEFAULT_BATCHER_FLUSH_INTERVAL_MS);
    if flush_ms == 0 {
        return Err(LoadError::invalid(
            "batcher.flush_interval_ms",
            "must be greater than zero",
        ));
    }

    let tables = match batcher.tables {
        Some(tables) => tables
            .into_iter()
            .map(|table| table.trim().to_string())
            .collect::<BTreeSet<_>>(),
        None => DEFAULT_BATCHER_TABLES
            .iter()
            .map(|table| table.to_string())
            .collect(),
    };
    if tables.is_empty() {
        return Err(LoadError::invalid(
            "batcher.tables",
            "at least one table is required",
        ));
    }
    if let Some(bad) = tables.iter().find(|table| !is_sql_identifier(table)) {
        return Err(LoadError::invalid(
            "batcher.tables",
            format!("`{bad}` is not a plain table identifier"),
        ));
    }

    Ok(BatcherSettings {
        max_batch,
        flush_interval: Duration::from_millis(flush_ms),
        tables,
    })
}

fn build_classifier_settings(
    classifier: RawClassifierSettings,
) -> Result<ClassifierSettings, LoadError> {
    let rules_path = classifier
        .rules_path
        .filter(|path| !path.as_os_str().is_empty());
    Ok(ClassifierSettings { rules_path })
}

/// `[A-Za-z_][A-Za-z0-9_]*`, the only table names interpolated into SQL.
fn is_sql_identifier(value: &str) -> bool {
    let mut chars = value.chars();
    chars
        .next()
        .is_some_and(|first| first.is_ascii_alphabetic() || first == '_')
        && chars.all(|ch| ch.is_ascii_alphanumeric() || ch == '_')
}

fn non_zero_usize(value: u64, key: &'static str) -> Result<NonZeroUsize, LoadError> {
    let value: usize = value
        .try_into()
        .map_err(|_| LoadError::invalid(key, "value exceeds supported range for usize"))?;
    NonZeroUsize::new(value).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawDatabaseSettings {
    url: Option<String>,
    max_connections: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawPoolSettings {
    size: Option<u64>,
    workers: Option<u64>,
    refill_interval_ms: Option<u64>,
    refill_threshold: Option<f64>,
    stats_interval_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawBatcherSettings {
    max_batch: Option<u64>,
    flush_interval_ms: Option<u64>,
    tables: Option<Vec<String>>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawClassifierSettings {
    rules_path: Option<PathBuf>,
}

#[cfg(test)]
mod tests;
