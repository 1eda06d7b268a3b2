use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueHint, builder::BoolishValueParser};

/// Command-line arguments for the pagepool binary.
#[derive(Debug, Parser)]
#[command(
    name = "pagepool",
    version,
    about = "Content pools, template cache and write-back batcher"
)]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "PAGEPOOL_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Hydrate the pools and templates, then keep the batcher running until ctrl-c.
    Run(Box<RunArgs>),
    /// Classify each input with the configured rules and print JSON results.
    Detect(DetectArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct RunArgs {
    #[command(flatten)]
    pub overrides: RunOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ClassifierOverride {
    /// Override the classifier rules file.
    #[arg(long = "classifier-rules", value_name = "PATH", value_hint = ValueHint::FilePath)]
    pub rules_path: Option<PathBuf>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct RunOverrides {
    #[command(flatten)]
    pub classifier: ClassifierOverride,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,

    /// Override the database connection URL.
    #[arg(long = "database-url", value_name = "URL")]
    pub database_url: Option<String>,

    /// Override the database pool size.
    #[arg(long = "database-max-connections", value_name = "COUNT")]
    pub database_max_connections: Option<u32>,

    /// Override the pending count that forces an inline flush.
    #[arg(long = "batcher-max-batch", value_name = "COUNT")]
    pub batcher_max_batch: Option<u64>,

    /// Override the background flush period.
    #[arg(long = "batcher-flush-interval-ms", value_name = "MILLIS")]
    pub batcher_flush_interval_ms: Option<u64>,

    /// Override how often pool statistics are logged.
    #[arg(long = "stats-interval-seconds", value_name = "SECONDS")]
    pub stats_interval_seconds: Option<u64>,
}

#[derive(Debug, Args, Clone)]
pub struct DetectArgs {
    #[command(flatten)]
    pub classifier: ClassifierOverride,

    /// Inputs to classify, typically user-agent strings.
    #[arg(value_name = "INPUT", required = true)]
    pub inputs: Vec<String>,
}
