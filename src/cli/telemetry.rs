use anyhow::{Result, anyhow};
use once_cell::sync::OnceCell;
use opentelemetry::propagation::TextMapCompositePropagator;
use opentelemetry::{KeyValue, global, trace::TracerProvider as _};
use opentelemetry_otlp::{Compression, WithExportConfig, WithTonicConfig};
use opentelemetry_sdk::{
    Resource,
    propagation::{BaggagePropagator, TraceContextPropagator},
    trace::{SdkTracerProvider, Tracer},
};
use std::{collections::HashMap, env::var, time::Duration};
use tonic::{
    metadata::{MetadataKey, MetadataMap, MetadataValue},
    transport::ClientTlsConfig,
};
use tracing::{Level, debug};
use tracing_subscriber::{EnvFilter, Registry, fmt, layer::SubscriberExt};
use ulid::Ulid;

static TRACER_PROVIDER: OnceCell<SdkTracerProvider> = OnceCell::new();

const DEFAULT_OTLP_ENDPOINT: &str = "http://localhost:4317";

/// Parse `OTEL_EXPORTER_OTLP_HEADERS` (`k1=v1,k2=v2`); pairs without `=` are skipped.
fn parse_headers_env(headers: &str) -> HashMap<String, String> {
    headers
        .split(',')
        .filter_map(|pair| {
            let (key, value) = pair.split_once('=')?;
            Some((key.trim().to_string(), value.trim().to_string()))
        })
        .collect()
}

fn headers_to_metadata(headers: &HashMap<String, String>) -> Result<MetadataMap> {
    let mut metadata = MetadataMap::with_capacity(headers.len());

    for (key, value) in headers {
        let key = key.to_ascii_lowercase();
        let name = MetadataKey::from_bytes(key.as_bytes())
            .map_err(|e| anyhow!("invalid metadata key {key}: {e}"))?;
        let value: MetadataValue<_> = value
            .parse()
            .map_err(|e| anyhow!("invalid metadata value for key {key}: {e}"))?;
        metadata.insert(name, value);
    }

    Ok(metadata)
}

fn normalize_endpoint(endpoint: String) -> String {
    if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
        endpoint
    } else {
        format!("https://{}", endpoint.trim_end_matches('/'))
    }
}

fn tls_domain(endpoint: &str) -> Option<&str> {
    endpoint
        .strip_prefix("https://")
        .and_then(|rest| rest.split('/').next())
        .and_then(|authority| authority.split(':').next())
        .filter(|host| !host.is_empty())
}

fn init_tracer() -> Result<Tracer> {
    if let Ok(protocol) = var("OTEL_EXPORTER_OTLP_PROTOCOL")
        && protocol != "grpc"
    {
        debug!(
            "OTEL_EXPORTER_OTLP_PROTOCOL='{}' ignored: only 'grpc' is supported",
            protocol
        );
    }

    let endpoint = normalize_endpoint(
        var("OTEL_EXPORTER_OTLP_ENDPOINT").unwrap_or_else(|_| DEFAULT_OTLP_ENDPOINT.to_string()),
    );

    let mut builder = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(&endpoint)
        .with_compression(Compression::Gzip)
        .with_timeout(Duration::from_secs(3));

    if let Some(host) = tls_domain(&endpoint) {
        builder = builder.with_tls_config(
            ClientTlsConfig::new()
                .domain_name(host.to_string())
                .with_native_roots(),
        );
    }

    let headers = var("OTEL_EXPORTER_OTLP_HEADERS")
        .ok()
        .map(|raw| parse_headers_env(&raw))
        .unwrap_or_default();
    if !headers.is_empty() {
        builder = builder.with_metadata(headers_to_metadata(&headers)?);
    }

    let exporter = builder.build()?;

    let instance_id = var("OTEL_SERVICE_INSTANCE_ID").unwrap_or_else(|_| Ulid::new().to_string());

    let provider = SdkTracerProvider::builder()
        .with_batch_exporter(exporter)
        .with_resource(
            Resource::builder_empty()
                .with_attributes(vec![
                    KeyValue::new("service.name", env!("CARGO_PKG_NAME")),
                    KeyValue::new("service.version", env!("CARGO_PKG_VERSION")),
                    KeyValue::new("service.instance.id", instance_id),
                ])
                .build(),
        )
        .build();

    let _ = TRACER_PROVIDER.set(provider.clone());

    global::set_tracer_provider(provider.clone());
    global::set_text_map_propagator(TextMapCompositePropagator::new(vec![
        Box::new(TraceContextPropagator::new()),
        Box::new(BaggagePropagator::new()),
    ]));

    Ok(provider.tracer(env!("CARGO_PKG_NAME")))
}

/// Initialize logging and, when `OTEL_EXPORTER_OTLP_ENDPOINT` is set, the OTLP
/// (gRPC) trace exporter.
///
/// # Errors
///
/// Returns an error if tracer or subscriber initialization fails
pub fn init(verbosity_level: Option<Level>) -> Result<()> {
    let verbosity_level = verbosity_level.unwrap_or(Level::ERROR);

    let fmt_layer = fmt::layer()
        .with_file(false)
        .with_line_number(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_target(false)
        .pretty();

    let filter = EnvFilter::builder()
        .with_default_directive(verbosity_level.into())
        .from_env_lossy()
        .add_directive("hyper=error".parse()?)
        .add_directive("tokio=error".parse()?)
        .add_directive("opentelemetry_sdk=warn".parse()?);

    if var("OTEL_EXPORTER_OTLP_ENDPOINT").is_ok() {
        let otel_layer = tracing_opentelemetry::layer().with_tracer(init_tracer()?);
        let subscriber = Registry::default()
            .with(fmt_layer)
            .with(otel_layer)
            .with(filter);
        tracing::subscriber::set_global_default(subscriber)?;
    } else {
        let subscriber = Registry::default().with(fmt_layer).with(filter);
        tracing::subscriber::set_global_default(subscriber)?;
    }

    Ok(())
}

/// Flush and stop the tracer provider (noop if OTLP was not enabled)
pub fn shutdown_tracer() {
    if let Some(provider) = TRACER_PROVIDER.get() {
        debug!("shutting down tracer provider");
        let _ = provider.shutdown();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn parse_headers_env_pairs() {
        assert!(parse_headers_env("").is_empty());

        let result = parse_headers_env("authorization = Bearer abc , x-tenant=verity,malformed");
        assert_eq!(result.len(), 2);
        assert_eq!(
            result.get("authorization").map(String::as_str),
            Some("Bearer abc")
        );
        assert_eq!(result.get("x-tenant").map(String::as_str), Some("verity"));
        assert!(!result.contains_key("malformed"));
    }

    #[test]
    fn headers_to_metadata_ascii() {
        let mut headers = HashMap::new();
        headers.insert("Authorization".to_string(), "Bearer abc".to_string());
        headers.insert("x-tenant".to_string(), "verity".to_string());

        let metadata = headers_to_metadata(&headers).unwrap();
        assert_eq!(metadata.len(), 2);
        assert!(metadata.get("authorization").is_some());
    }

    #[test]
    fn headers_to_metadata_rejects_invalid_key() {
        let mut headers = HashMap::new();
        headers.insert("bad key".to_string(), "value".to_string());
        assert!(headers_to_metadata(&headers).is_err());
    }

    #[test]
    fn normalize_endpoint_defaults_to_https() {
        assert_eq!(
            normalize_endpoint("http://localhost:4317".to_string()),
            "http://localhost:4317"
        );
        assert_eq!(
            normalize_endpoint("collector.example.com:4317/".to_string()),
            "https://collector.example.com:4317"
        );
    }

    #[test]
    fn tls_domain_only_for_https() {
        assert_eq!(
            tls_domain("https://collector.example.com:4317/v1/traces"),
            Some("collector.example.com")
        );
        assert_eq!(tls_domain("http://localhost:4317"), None);
    }

    #[test]
    fn shutdown_tracer_without_provider() {
        shutdown_tracer();
    }
}
