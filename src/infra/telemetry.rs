use std::sync::Once;

use metrics::{Unit, describe_counter};
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
///
/// Log output goes to stderr: stdout carries the line protocol and must stay
/// clean.
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
            .with_writer(std::io::stderr)
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .compact()
            .with_target(true)
            .with_writer(std::io::stderr)
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
            "deckmill_publish_total",
            Unit::Count,
            "Total number of artifacts published."
        );
        describe_counter!(
            "deckmill_download_total",
            Unit::Count,
            "Total number of artifact downloads served."
        );
        describe_counter!(
            "deckmill_download_expired_total",
            Unit::Count,
            "Total number of download requests that hit an expired link."
        );
        describe_counter!(
            "deckmill_reaped_total",
            Unit::Count,
            "Total number of expired artifacts removed by the sweep."
        );
        describe_counter!(
            "deckmill_convert_fail_total",
            Unit::Count,
            "Total number of failed deck conversions."
        );
    });
}
