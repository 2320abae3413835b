use opentelemetry::trace::TracerProvider as _;
use opentelemetry_otlp::WithExportConfig;
use tracing::Subscriber;
use tracing_opentelemetry::OpenTelemetryLayer;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::prelude::*;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{EnvFilter, Registry};

use crate::constants::OTEL_COLLECTOR_SVC_ENV_VAR;

pub fn setup(env_filter: &str) {
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_file(true)
        .with_line_number(true)
        .with_span_events(FmtSpan::NEW)
        .with_target(false)
        .compact();

    let (otel_layer, otel_failure) = build_otel_layer();

    Registry::default().with(EnvFilter::new(env_filter)).with(fmt_layer).with(otel_layer).init();

    if let Some(err) = otel_failure {
        tracing::warn!(%err, "failed to initialize OTLP exporter, continuing without trace export");
    }
}

/// Best-effort OTLP exporter wiring (spec.md §4.8): only attempted when `OTEL_COLLECTOR_SVC` is
/// set, and a failure here is reported after the subscriber is up rather than aborting startup.
fn build_otel_layer<S>() -> (Option<OpenTelemetryLayer<S, opentelemetry_sdk::trace::Tracer>>, Option<String>)
where
    S: Subscriber + for<'span> LookupSpan<'span>,
{
    let Ok(endpoint) = std::env::var(OTEL_COLLECTOR_SVC_ENV_VAR) else {
        return (None, None);
    };

    let provider = opentelemetry_otlp::new_pipeline()
        .tracing()
        .with_exporter(opentelemetry_otlp::new_exporter().tonic().with_endpoint(&endpoint))
        .install_batch(opentelemetry_sdk::runtime::Tokio);

    match provider {
        Ok(provider) => {
            let tracer = provider.tracer_builder("cagent").with_version(env!("CARGO_PKG_VERSION")).build();
            (Some(OpenTelemetryLayer::new(tracer)), None)
        },
        Err(err) => (None, Some(err.to_string())),
    }
}

/// Logs the running image tag once at startup, if the orchestrator set one.
pub fn log_release_banner() {
    if let Ok(release) = std::env::var(crate::constants::RELEASE_ENV_VAR) {
        tracing::info!(release, "collector agent starting");
    } else {
        tracing::info!("collector agent starting");
    }
}
