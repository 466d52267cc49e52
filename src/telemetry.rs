use opentelemetry::{KeyValue, trace::TracerProvider as _};
use opentelemetry_otlp::{Protocol, WithExportConfig, WithTonicConfig};
use opentelemetry_sdk::{
    Resource,
    trace::{RandomIdGenerator, Sampler, SdkTracerProvider},
};
use opentelemetry_semantic_conventions::{
    SCHEMA_URL,
    attribute::{SERVICE_NAME, SERVICE_VERSION},
    resource::DEPLOYMENT_ENVIRONMENT_NAME,
};
use rocket::{
    Data, Request, Response,
    fairing::{Fairing, Info, Kind},
    http::Header,
};
use std::time::Instant;
use tonic::metadata::{Ascii, MetadataKey, MetadataMap, MetadataValue};
use tracing::{Span, field, info_span};
use tracing_opentelemetry::OpenTelemetryLayer;
use tracing_subscriber::{Layer, layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use crate::TELEMETRY_GUARD;
use crate::config::Config;

pub const REQUEST_ID_HEADER: &str = "X-Request-Id";

struct RequestTrace {
    span: Span,
    request_id: String,
    start_time: Instant,
}

pub struct TelemetryFairing;

#[rocket::async_trait]
impl Fairing for TelemetryFairing {
    fn info(&self) -> Info {
        Info {
            name: "OpenTelemetry",
            kind: Kind::Request | Kind::Response,
        }
    }

    async fn on_request(&self, request: &mut Request<'_>, _: &mut Data<'_>) {
        let method = request.method().to_string();
        let uri = request.uri().to_string();
        let request_id = request
            .headers()
            .get_one(REQUEST_ID_HEADER)
            .map(String::from)
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let span = info_span!(
            "http_request",
            otel.name = format!("{} {}", method, uri),
            http.method = method,
            http.uri = uri,
            http.request_id = request_id.as_str(),
            http.status_code = field::Empty,
            http.duration_ms = field::Empty,
            error = field::Empty,
            error.type = field::Empty,
            error.message = field::Empty,
            otel.status_code = field::Empty,
        );

        request.local_cache(|| RequestTrace {
            span,
            request_id,
            start_time: Instant::now(),
        });
    }

    async fn on_response<'r>(&self, request: &'r Request<'_>, response: &mut Response<'r>) {
        let trace = request.local_cache(|| RequestTrace {
            span: info_span!("http_request"),
            request_id: Uuid::new_v4().to_string(),
            start_time: Instant::now(),
        });

        let duration = trace.start_time.elapsed();
        let status = response.status().code;

        trace.span.record("http.status_code", status);
        trace.span.record("http.duration_ms", duration.as_millis() as i64);

        response.set_header(Header::new(REQUEST_ID_HEADER, trace.request_id.clone()));

        let _entered = trace.span.enter();
        tracing::info!(
            "Completed request in {}ms with status {}",
            duration.as_millis(),
            status
        );
    }
}

/// Echoes an allowed `Origin` back with the CORS headers the frontend needs.
pub struct CorsFairing {
    config: Config,
}

impl CorsFairing {
    pub fn new(config: Config) -> Self {
        Self { config }
    }
}

#[rocket::async_trait]
impl Fairing for CorsFairing {
    fn info(&self) -> Info {
        Info {
            name: "CORS",
            kind: Kind::Response,
        }
    }

    async fn on_response<'r>(&self, request: &'r Request<'_>, response: &mut Response<'r>) {
        let Some(origin) = request.headers().get_one("Origin") else {
            return;
        };

        if !self.config.is_origin_allowed(origin) {
            tracing::debug!(origin, "Origin not allowed, skipping CORS headers");
            return;
        }

        response.set_header(Header::new("Access-Control-Allow-Origin", origin.to_string()));
        response.set_header(Header::new("Access-Control-Allow-Credentials", "true"));
        response.set_header(Header::new(
            "Access-Control-Allow-Methods",
            "GET, POST, PUT, PATCH, DELETE, OPTIONS",
        ));
        response.set_header(Header::new(
            "Access-Control-Allow-Headers",
            "Authorization, Content-Type",
        ));
        response.set_header(Header::new("Vary", "Origin"));
    }
}

fn resource(environment: &str) -> Resource {
    Resource::builder()
        .with_schema_url(
            [
                KeyValue::new(SERVICE_NAME, env!("CARGO_PKG_NAME")),
                KeyValue::new(SERVICE_VERSION, env!("CARGO_PKG_VERSION")),
                KeyValue::new(DEPLOYMENT_ENVIRONMENT_NAME, environment.to_string()),
            ],
            SCHEMA_URL,
        )
        .build()
}

/// Parses `OTEL_EXPORTER_OTLP_HEADERS` style `key=value,key=value` pairs. Malformed pairs are
/// skipped.
fn otlp_metadata(raw: &str) -> MetadataMap {
    let mut metadata = MetadataMap::new();

    for pair in raw.split(',') {
        let Some((key, value)) = pair.split_once('=') else {
            continue;
        };

        match (
            MetadataKey::<Ascii>::from_bytes(key.trim().to_ascii_lowercase().as_bytes()),
            MetadataValue::<Ascii>::try_from(value.trim()),
        ) {
            (Ok(key), Ok(value)) => {
                metadata.insert(key, value);
            }
            _ => eprintln!("Skipping malformed OTLP header '{}'", key.trim()),
        }
    }

    metadata
}

// Construct TracerProvider for OpenTelemetryLayer
fn init_tracer_provider(endpoint: &str, environment: &str) -> anyhow::Result<SdkTracerProvider> {
    let metadata = otlp_metadata(&std::env::var("OTEL_EXPORTER_OTLP_HEADERS").unwrap_or_default());

    let mut builder = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .with_protocol(Protocol::Grpc)
        .with_metadata(metadata);

    if endpoint.starts_with("https://") {
        builder =
            builder.with_tls_config(tonic::transport::ClientTlsConfig::new().with_native_roots());
    }

    let exporter = builder.build()?;

    let tracer_provider = SdkTracerProvider::builder()
        .with_sampler(Sampler::AlwaysOn)
        .with_id_generator(RandomIdGenerator::default())
        .with_resource(resource(environment))
        .with_batch_exporter(exporter)
        .build();

    Ok(tracer_provider)
}

pub struct OtelGuard {
    tracer_provider: SdkTracerProvider,
}

/// Installs the global subscriber. Spans are exported over OTLP only when
/// `OTEL_EXPORTER_OTLP_ENDPOINT` is set.
pub fn init_tracing() -> anyhow::Result<()> {
    let environment = std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let tracer_provider = match std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT") {
        Ok(endpoint) if !endpoint.trim().is_empty() => {
            Some(init_tracer_provider(endpoint.trim(), &environment)?)
        }
        _ => None,
    };

    let otel_layer = tracer_provider
        .as_ref()
        .map(|provider| OpenTelemetryLayer::new(provider.tracer(env!("CARGO_PKG_NAME"))).boxed());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .with(otel_layer)
        .try_init()?;

    if let Some(tracer_provider) = tracer_provider {
        let mut guard = TELEMETRY_GUARD
            .lock()
            .map_err(|_| anyhow::anyhow!("Telemetry guard lock poisoned"))?;
        *guard = Some(OtelGuard { tracer_provider });
    }

    Ok(())
}

impl Drop for OtelGuard {
    fn drop(&mut self) {
        if let Err(err) = self.tracer_provider.shutdown() {
            eprintln!("Failed to shut down tracer provider: {:?}", err);
        }
    }
}

pub fn shutdown_telemetry() {
    println!("Shutting down telemetry...");

    let guard = TELEMETRY_GUARD
        .lock()
        .map(|mut guard| guard.take())
        .unwrap_or_default();
    drop(guard); // This will trigger the Drop impl and shutdown
}
