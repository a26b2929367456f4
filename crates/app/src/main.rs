use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use opentelemetry::trace::TracerProvider as _;
use opentelemetry_otlp::WithExportConfig as _;

use ka_app::cli::{Cli, Command};
use ka_domain::config::ObservabilityConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Some(Command::Version) = cli.command {
        println!("kbagent {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let (config, config_path) = ka_app::cli::load_config()?;
    let tracer_provider = init_tracing(&config.observability);
    tracing::debug!(config_path = %config_path, "configuration loaded");

    let result = match cli.command {
        // Default to chat when no subcommand is given.
        None | Some(Command::Chat) => ka_app::cli::chat::chat(Arc::new(config)).await,
        Some(Command::Weather { question }) => ka_app::cli::weather::run(&config, question).await,
        Some(Command::Probe) => {
            let passed = ka_app::cli::probe::run(&config).await;
            shutdown_tracing(tracer_provider);
            if !passed {
                std::process::exit(1);
            }
            return Ok(());
        }
        Some(Command::Version) => Ok(()),
    };

    shutdown_tracing(tracer_provider);
    result
}

/// Compact stderr tracing, defaulting to `warn` so diagnostics never mix
/// with replies on stdout.
///
/// When `otlp_endpoint` is configured, an OpenTelemetry layer also exports
/// every span over OTLP/gRPC. The returned provider must be shut down on
/// exit to flush pending spans.
fn init_tracing(obs: &ObservabilityConfig) -> Option<opentelemetry_sdk::trace::SdkTracerProvider> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .compact();

    let Some(endpoint) = &obs.otlp_endpoint else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .init();
        return None;
    };

    let exporter = match opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()
    {
        Ok(e) => e,
        Err(e) => {
            eprintln!(
                "WARNING: failed to create OTLP exporter for {endpoint}: {e}; \
                 continuing without OpenTelemetry"
            );
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt_layer)
                .init();
            return None;
        }
    };

    let resource = opentelemetry_sdk::Resource::builder()
        .with_service_name(obs.service_name.clone())
        .build();

    let tracer_provider = opentelemetry_sdk::trace::SdkTracerProvider::builder()
        .with_batch_exporter(exporter)
        .with_sampler(opentelemetry_sdk::trace::Sampler::TraceIdRatioBased(
            obs.sample_rate,
        ))
        .with_resource(resource)
        .build();

    let otel_layer =
        tracing_opentelemetry::layer().with_tracer(tracer_provider.tracer("kbagent"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .with(otel_layer)
        .init();

    Some(tracer_provider)
}

fn shutdown_tracing(provider: Option<opentelemetry_sdk::trace::SdkTracerProvider>) {
    if let Some(provider) = provider {
        if let Err(e) = provider.shutdown() {
            tracing::warn!(error = ?e, "OpenTelemetry tracer provider shutdown failed");
        }
    }
}
