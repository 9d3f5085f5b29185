use anyhow::{Context, Result};
use folio_media::api::{start_api_server, AppState};
use folio_media::catalog::Synchronizer;
use folio_media::collections::CollectionStore;
use folio_media::config::Config;
use folio_media::crud::MediaCrud;
use folio_media::csrf::CsrfTokens;
use folio_media::encoder::{select_encoder, VideoProbe};
use folio_media::github::GithubUploader;
use folio_media::paths::MediaPaths;
use folio_media::thumbnail::Thumbnailer;
use folio_media::upload::UploadPipeline;
use folio_media::validate::Validator;
use folio_media::video_index::VideoIndex;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::load().context("Failed to load configuration")?;

    // Initialize logging
    init_tracing(&config.service.log_level);

    info!(service = %config.service.name, "Starting media backend");

    // Initialize metrics; a busy listener port must not take the service down
    if let Err(e) = init_metrics(config.service.metrics_port) {
        warn!(error = %e, "Prometheus metrics exporter not started");
    }

    // Prepare the asset tree and the document directory
    let paths = MediaPaths::new(&config.storage.asset_root);
    paths
        .ensure_directories()
        .await
        .context("Failed to create asset directories")?;

    let collections = Arc::new(CollectionStore::new(&config.storage.data_dir));
    collections
        .ensure_data_dir()
        .await
        .context("Failed to create the data directory")?;

    // Open the video index
    let index = Arc::new(
        VideoIndex::open(&config.storage)
            .await
            .context("Failed to open the video index")?,
    );

    // Discover the encoder once at startup
    let encoder = select_encoder(&config.encoder).await;
    let probe = VideoProbe::sibling_of(encoder.binary_path());

    let synchronizer = Arc::new(Synchronizer::new(
        index.clone(),
        collections.clone(),
        paths.clone(),
    ));

    let crud = Arc::new(MediaCrud::new(
        Validator::new(config.limits.clone()),
        Thumbnailer::new(config.media.clone()),
        collections.clone(),
        paths.clone(),
    ));

    let pipeline = Arc::new(UploadPipeline::new(
        Validator::new(config.limits.clone()),
        encoder.clone(),
        probe,
        index.clone(),
        synchronizer.clone(),
        GithubUploader::from_config(&config.github),
        paths.clone(),
    ));

    // Create API state
    let state = AppState {
        crud,
        pipeline,
        synchronizer,
        csrf: Arc::new(CsrfTokens::new(config.csrf_ttl())),
        index,
        encoder,
        paths,
    };

    // Spawn API server task
    let api_config = config.api.clone();
    let limits = config.limits.clone();
    let api_handle = tokio::spawn(async move {
        if let Err(e) = start_api_server(state, &api_config, &limits).await {
            error!(error = %e, "API server error");
        }
    });

    info!("Media backend started successfully");

    // Wait for shutdown signal
    shutdown_signal().await;

    info!("Shutting down media backend");

    api_handle.abort();

    info!("Media backend stopped");

    Ok(())
}

/// Initialize tracing/logging
fn init_tracing(log_level: &str) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().json())
        .init();
}

/// Initialize Prometheus metrics exporter
fn init_metrics(port: u16) -> Result<()> {
    let builder = metrics_exporter_prometheus::PrometheusBuilder::new();

    builder
        .with_http_listener(([0, 0, 0, 0], port))
        .install()
        .context("Failed to install Prometheus metrics exporter")?;

    info!(port = port, "Prometheus metrics exporter started");

    Ok(())
}

/// Wait for shutdown signal (SIGINT or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            info!("Received SIGTERM signal");
        }
    }
}
