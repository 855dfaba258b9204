//! Tracing subscriber setup, with optional OpenTelemetry span export.

use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};

/// Environment variable selecting the log format (`json` or anything else for text).
pub const LOG_FORMAT_ENV: &str = "TOLLGATE_LOG_FORMAT";

fn env_filter(default_filter: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter))
}

/// Initialize tracing for the process.
///
/// The subscriber respects `RUST_LOG` and falls back to `default_filter`
/// when it is unset. Logs are human-readable unless `TOLLGATE_LOG_FORMAT=json`.
/// With the `otel` feature, spans are additionally exported to stdout through
/// OpenTelemetry.
///
/// # Errors
///
/// Returns error if a global subscriber is already installed.
pub fn init_telemetry(default_filter: &str) -> Result<(), Box<dyn std::error::Error>> {
    let json = std::env::var(LOG_FORMAT_ENV).is_ok_and(|format| format.eq_ignore_ascii_case("json"));

    // Create fmt layer for human-readable logs
    let text_layer = (!json).then(|| {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_level(true)
            .with_filter(env_filter(default_filter))
    });

    let json_layer = json.then(|| {
        tracing_subscriber::fmt::layer()
            .json()
            .with_filter(env_filter(default_filter))
    });

    let registry = tracing_subscriber::registry().with(text_layer).with(json_layer);

    #[cfg(feature = "otel")]
    let registry = registry.with(otel::layer(default_filter));

    registry.try_init()?;

    Ok(())
}

/// Shutdown OpenTelemetry and flush pending spans.
///
/// Call this before application exit to ensure all spans are exported.
/// Without the `otel` feature this does nothing.
pub fn shutdown_telemetry() {
    #[cfg(feature = "otel")]
    opentelemetry::global::shutdown_tracer_provider();
}

#[cfg(feature = "otel")]
mod otel {
    use opentelemetry::trace::TracerProvider as _;
    use opentelemetry_sdk::{
        Resource,
        trace::{RandomIdGenerator, Sampler, TracerProvider},
    };
    use opentelemetry_stdout::SpanExporter;
    use tracing::Subscriber;
    use tracing_subscriber::{Layer, registry::LookupSpan};

    pub(super) fn layer<S>(default_filter: &str) -> impl Layer<S>
    where
        S: Subscriber + for<'span> LookupSpan<'span>,
    {
        let provider = TracerProvider::builder()
            .with_simple_exporter(SpanExporter::default())
            .with_id_generator(RandomIdGenerator::default())
            .with_sampler(Sampler::AlwaysOn)
            .with_resource(Resource::default())
            .build();

        let tracer = provider.tracer("tollgate");
        opentelemetry::global::set_tracer_provider(provider);

        tracing_opentelemetry::layer()
            .with_tracer(tracer)
            .with_filter(super::env_filter(default_filter))
    }
}
