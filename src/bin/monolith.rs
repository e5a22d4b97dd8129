//! Monolith Binary - Local deployment
//!
//! It wires up:
//! - Filesystem storage adapter, served under /media
//! - ffprobe/ffmpeg executors
//! - HTTP upload endpoint streaming job status as server-sent events

use abrpack::adapters::local::{
    fs::FsAdapter,
    http::{router, AppState},
};
use abrpack::config::LocalConfig;
use abrpack::domain::av::probe::FfprobeProber;
use abrpack::domain::av::segments::FfmpegTranscoder;
use abrpack::JobCoordinator;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let config = LocalConfig::from_env();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    for dir in [&config.upload_dir, &config.storage_dir, &config.pipeline.work_dir] {
        if let Err(e) = tokio::fs::create_dir_all(dir).await {
            tracing::error!("Failed to create {:?}: {}", dir, e);
            std::process::exit(1);
        }
    }

    // 1. Adapters
    let storage = Arc::new(FsAdapter::new(&config.storage_dir, &config.public_base_url));
    let encoder = Arc::new(FfmpegTranscoder::new(
        &config.pipeline.ffmpeg_bin,
        config.pipeline.encoder_settings(),
    ));
    let prober = Arc::new(FfprobeProber::new(&config.pipeline.ffprobe_bin));

    // 2. Application Services
    let coordinator = Arc::new(JobCoordinator::new(storage, encoder, prober, &config.pipeline));
    tracing::info!(
        max_concurrent_jobs = config.pipeline.max_concurrent_jobs,
        "Job coordinator ready"
    );

    // 3. HTTP Layer
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let state = AppState {
        coordinator,
        upload_dir: config.upload_dir.clone(),
        work_dir: config.pipeline.work_dir.clone(),
    };
    let app = router(state, &config.storage_dir).layer(cors);

    // 4. Start Server
    let listener = tokio::net::TcpListener::bind(format!("{}:{}", config.addr, config.port))
        .await
        .expect("Failed to bind TCP listener");
    tracing::info!("Listening at {}:{}", config.addr, config.port);
    axum::serve(listener, app)
        .await
        .expect("Server failed to start");
}
