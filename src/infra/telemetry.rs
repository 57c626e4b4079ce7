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

/// Install a global tracing subscriber using the provided logging settings.
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
            "lectern_cache_hit_total",
            Unit::Count,
            "Queries answered from the response cache."
        );
        describe_counter!(
            "lectern_cache_miss_total",
            Unit::Count,
            "Cache lookups that found no usable entry."
        );
        describe_counter!(
            "lectern_cache_bypass_total",
            Unit::Count,
            "Queries served without consulting the cache."
        );
        describe_counter!(
            "lectern_cache_store_error_total",
            Unit::Count,
            "Key/value store failures absorbed by the cache manager."
        );
        describe_counter!(
            "lectern_cache_invalidated_total",
            Unit::Count,
            "Cache entries removed by explicit invalidation."
        );
        describe_counter!(
            "lectern_cache_evict_total",
            Unit::Count,
            "In-process cache entries evicted due to capacity."
        );
        describe_histogram!(
            "lectern_resolve_ms",
            Unit::Milliseconds,
            "Query resolution latency in milliseconds."
        );
    });
}
