use std::sync::Once;

use metrics::{Unit, describe_counter, describe_gauge, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Caps sqlx per-statement events at warn.
const QUIET_QUERY_DIRECTIVE: &str = "sqlx::query=warn";

/// Install the global tracing subscriber and describe the pagepool metrics.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let quiet_queries = QUIET_QUERY_DIRECTIVE
        .parse()
        .map_err(|err| InfraError::telemetry(format!("invalid log directive: {err}")))?;
    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy()
        .add_directive(quiet_queries);

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(true).boxed(),
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
            "pagepool_pool_hit_total",
            Unit::Count,
            "Pool reads served from the requested or default group."
        );
        describe_counter!(
            "pagepool_pool_miss_total",
            Unit::Count,
            "Pool reads that found neither the requested nor the default group."
        );
        describe_gauge!(
            "pagepool_template_count",
            Unit::Count,
            "Templates currently held by the template cache."
        );
        describe_histogram!(
            "pagepool_batcher_flush_ms",
            Unit::Milliseconds,
            "Update batcher flush latency in milliseconds."
        );
        describe_counter!(
            "pagepool_batcher_flushed_total",
            Unit::Count,
            "Status updates committed by the update batcher."
        );
        describe_counter!(
            "pagepool_batcher_skipped_total",
            Unit::Count,
            "Status updates dropped because their table is not allowed."
        );
        describe_counter!(
            "pagepool_batcher_flush_error_total",
            Unit::Count,
            "Update batcher flushes that failed and kept their queue."
        );
        describe_counter!(
            "pagepool_classify_hit_total",
            Unit::Count,
            "Classifier lookups answered from the result cache."
        );
        describe_counter!(
            "pagepool_classify_miss_total",
            Unit::Count,
            "Classifier lookups that evaluated the rules."
        );
    });
}
