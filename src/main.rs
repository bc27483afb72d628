use std::sync::Arc;

use axum::routing::get;
use metrics_exporter_prometheus::PrometheusBuilder;
use tokio_util::sync::CancellationToken;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use region_redact::app_state::AppState;
use region_redact::config::{AppConfig, StorageBackend};
use region_redact::routes;
use region_redact::services::{
    job_store::JobStore,
    pipeline::RedactionPipeline,
    storage::{MemoryObjectStore, ObjectStore, S3ObjectStore},
    webhook::{HttpTransport, WebhookNotifier},
};

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    let config = AppConfig::from_env().expect("Failed to load configuration from environment");

    tracing::info!("Initializing region-redact server");

    let prometheus_handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus metrics recorder");
    let prometheus_handle = Arc::new(prometheus_handle);

    metrics::describe_counter!("redact_requests_total", "Redaction requests by route");
    metrics::describe_histogram!(
        "redact_processing_seconds",
        "Time spent decoding, compositing and encoding one image"
    );
    metrics::describe_counter!("batch_jobs_submitted_total", "Batch jobs accepted");
    metrics::describe_counter!("batch_jobs_finished_total", "Batch jobs that reached a terminal state");
    metrics::describe_counter!("batch_items_completed", "Batch items redacted successfully");
    metrics::describe_counter!("batch_items_failed", "Batch items that failed");
    metrics::describe_counter!("webhook_deliveries_total", "Webhook delivery outcomes");

    let storage: Arc<dyn ObjectStore> = match config.storage_backend {
        StorageBackend::S3 => {
            tracing::info!("Initializing S3 object store");
            let (Some(endpoint), Some(access_key), Some(secret_key)) = (
                config.s3_endpoint.as_deref(),
                config.s3_access_key.as_deref(),
                config.s3_secret_key.as_deref(),
            ) else {
                panic!("S3_ENDPOINT, S3_ACCESS_KEY and S3_SECRET_KEY must be set for the s3 backend");
            };
            Arc::new(
                S3ObjectStore::new(endpoint, &config.s3_region, access_key, secret_key)
                    .expect("Failed to initialize S3 client"),
            )
        }
        StorageBackend::Memory => {
            tracing::warn!("Using in-memory object store; objects are lost on restart");
            Arc::new(MemoryObjectStore::new())
        }
    };

    let shutdown = CancellationToken::new();
    let transport = HttpTransport::new(config.webhook_timeout())
        .expect("Failed to initialize webhook HTTP client");
    let notifier = WebhookNotifier::new(Arc::new(transport), shutdown.clone());

    let state = AppState::new(
        RedactionPipeline::new(config.pipeline_limits()),
        storage,
        JobStore::new(config.job_store_config()),
        notifier,
        config.webhook_url.clone(),
    )
    .with_batch_limits(config.max_batch_items, config.estimated_item_ms);

    let app = routes::api_router(state)
        // Prometheus metrics endpoint (separate state)
        .route(
            "/metrics",
            get(routes::metrics::prometheus_metrics).with_state(prometheus_handle),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await
        .expect("Server error");
}

async fn shutdown_signal(shutdown: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
    tracing::info!("Shutdown requested, cancelling pending webhook retries");
    shutdown.cancel();
}
