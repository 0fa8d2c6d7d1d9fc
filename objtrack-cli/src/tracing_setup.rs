//! Log and trace output for the `objtrack` binary.
//!
//! Logs go to stderr so stdout carries nothing but invocation results. With
//! `--otel` (and the `telemetry` feature) every `invocation` span, carrying
//! its `invocation_id` and record count, is also exported over OTLP; the
//! exporter reads `OTEL_EXPORTER_OTLP_ENDPOINT` itself.

use anyhow::{anyhow, Result};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

const DEFAULT_FILTER: &str = "objtrack=info,objtrack_core=info,sqlx=warn";
const DEBUG_FILTER: &str = "objtrack=debug,objtrack_core=debug,sqlx=info";

#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Debug filter unless RUST_LOG is set
    pub debug: bool,
    pub otel: bool,
    /// `service.name` on exported spans
    pub service_name: String,
}

fn env_filter(debug: bool) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(if debug { DEBUG_FILTER } else { DEFAULT_FILTER })
    })
}

pub fn init(config: &TracingConfig) -> Result<()> {
    let stderr = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(config.debug)
        .compact();
    let registry = tracing_subscriber::registry()
        .with(env_filter(config.debug))
        .with(stderr);

    #[cfg(feature = "telemetry")]
    {
        let export = if config.otel {
            Some(otlp::layer(&config.service_name)?)
        } else {
            None
        };
        registry.with(export).try_init().map_err(|err| anyhow!(err))?;
        if config.otel {
            tracing::info!(service = %config.service_name, "exporting invocation spans over OTLP");
        }
    }

    #[cfg(not(feature = "telemetry"))]
    {
        registry.try_init().map_err(|err| anyhow!(err))?;
        if config.otel {
            tracing::warn!("--otel ignored: built without the `telemetry` feature");
        }
    }

    Ok(())
}

#[cfg(feature = "telemetry")]
mod otlp {
    use anyhow::{anyhow, Result};
    use opentelemetry::trace::TracerProvider as _;
    use opentelemetry::KeyValue;
    use opentelemetry_sdk::trace::{Tracer, TracerProvider};
    use opentelemetry_sdk::Resource;
    use tracing::Subscriber;
    use tracing_opentelemetry::OpenTelemetryLayer;
    use tracing_subscriber::registry::LookupSpan;

    pub fn layer<S>(service_name: &str) -> Result<OpenTelemetryLayer<S, Tracer>>
    where
        S: Subscriber + for<'span> LookupSpan<'span>,
    {
        let exporter = opentelemetry_otlp::SpanExporter::builder()
            .with_tonic()
            .build()
            .map_err(|e| anyhow!("failed to create OTLP exporter: {}", e))?;

        let provider = TracerProvider::builder()
            .with_batch_exporter(exporter, opentelemetry_sdk::runtime::Tokio)
            .with_resource(Resource::new(vec![
                KeyValue::new("service.name", service_name.to_owned()),
                KeyValue::new("service.version", env!("CARGO_PKG_VERSION")),
            ]))
            .build();

        let tracer = provider.tracer("objtrack");
        // Held globally until `shutdown` flushes it
        let _ = opentelemetry::global::set_tracer_provider(provider);

        Ok(tracing_opentelemetry::layer().with_tracer(tracer))
    }
}

/// Flush exported spans before exit.
pub fn shutdown() {
    #[cfg(feature = "telemetry")]
    opentelemetry::global::shutdown_tracer_provider();
}
