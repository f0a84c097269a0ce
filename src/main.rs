use std::path::{Path, PathBuf};

use clap::Parser;
use gateway_reconciler::Configuration;
use opentelemetry::trace::TracerProvider;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::trace::{RandomIdGenerator, Sampler, SdkTracerProvider};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    filter,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer, Registry,
};

const DEFAULT_OTLP_ENDPOINT: &str = "http://127.0.0.1:4317";
const OTLP_EXPORT_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(3);

/// Flushes the log file and the span exporter when dropped.
pub struct LogGuard {
    _file: WorkerGuard,
    tracer_provider: Option<SdkTracerProvider>,
}

impl Drop for LogGuard {
    fn drop(&mut self) {
        if let Some(tracer_provider) = self.tracer_provider.take() {
            let _ = tracer_provider.shutdown();
        }
    }
}

#[derive(Parser, Debug)]
#[command(version, about = "Translates Gateways, VirtualServices and RouteTables into Proxies", long_about = None)]
pub struct CommandArgs {
    /// YAML controller configuration.
    #[arg(long)]
    with_config_file: PathBuf,
    /// Directory receiving `<controller name>.log`.
    #[arg(long, default_value = ".")]
    log_dir: PathBuf,
    /// Collector receiving spans when `enableOpenTelemetry` is set.
    #[arg(long, default_value = DEFAULT_OTLP_ENDPOINT)]
    otlp_endpoint: String,
}

fn load_configuration(path: &Path) -> gateway_reconciler::Result<Configuration> {
    let configuration: Configuration = serde_yaml::from_str(&std::fs::read_to_string(path)?)?;
    configuration.validate()?;
    Ok(configuration)
}

fn env_filter(variable: &str, default_directives: &str) -> EnvFilter {
    EnvFilter::new(std::env::var(variable).unwrap_or_else(|_| default_directives.to_owned()))
}

fn otlp_tracer_provider(controller_name: &str, endpoint: &str) -> gateway_reconciler::Result<SdkTracerProvider> {
    let exporter = opentelemetry_otlp::SpanExporter::builder().with_tonic().with_endpoint(endpoint).with_timeout(OTLP_EXPORT_TIMEOUT).build()?;
    Ok(SdkTracerProvider::builder()
        .with_batch_exporter(exporter)
        .with_id_generator(RandomIdGenerator::default())
        .with_sampler(Sampler::AlwaysOn)
        .with_resource(opentelemetry_sdk::Resource::builder().with_attributes(vec![opentelemetry::KeyValue::new("service.name", controller_name.to_owned())]).build())
        .build())
}

fn init_tracing_logging(configuration: &Configuration, args: &CommandArgs) -> gateway_reconciler::Result<LogGuard> {
    let controller_name = configuration.controller_name.as_str();
    let file_appender = tracing_appender::rolling::never(&args.log_dir, format!("{controller_name}.log"));
    let (non_blocking_appender, file_guard) = tracing_appender::non_blocking(file_appender);

    // Spans only go to the collector, the fmt layers print events.
    let console_layer = fmt::layer()
        .event_format(fmt::format().compact())
        .with_target(true)
        .with_span_events(FmtSpan::NONE)
        .with_ansi(false)
        .with_filter(filter::filter_fn(|meta| !meta.is_span()))
        .with_filter(env_filter("RUST_LOG", "info,gateway_reconciler=debug,kube=warn"));
    let file_layer = fmt::layer()
        .with_writer(non_blocking_appender)
        .with_span_events(FmtSpan::NONE)
        .with_target(true)
        .with_ansi(false)
        .with_filter(filter::filter_fn(|meta| !meta.is_span()))
        .with_filter(env_filter("RUST_FILE_LOG", "debug"));

    let tracer_provider = if configuration.enable_open_telemetry == Some(true) {
        let tracer_provider = otlp_tracer_provider(controller_name, &args.otlp_endpoint)?;
        let telemetry = tracing_opentelemetry::layer().with_tracer(tracer_provider.tracer(controller_name.to_owned()));
        Registry::default().with(console_layer).with(file_layer).with(telemetry.with_filter(env_filter("RUST_TRACE_LOG", "info"))).init();
        Some(tracer_provider)
    } else {
        Registry::default().with(console_layer).with(file_layer).init();
        None
    };
    Ok(LogGuard { _file: file_guard, tracer_provider })
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> gateway_reconciler::Result<()> {
    let args = CommandArgs::parse();
    let configuration = load_configuration(&args.with_config_file)?;
    let _guard = init_tracing_logging(&configuration, &args)?;
    info!(
        "Controller {} writing proxies to {} watching {}",
        configuration.controller_name,
        configuration.write_namespace,
        configuration.watch_namespace.as_deref().unwrap_or("all namespaces")
    );

    gateway_reconciler::start(configuration).await
}
