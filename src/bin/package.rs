//! Package one local file and print its status stream.
//!
//! Usage: abrpack-package <input> [content-type]

use abrpack::adapters::local::fs::FsAdapter;
use abrpack::config::LocalConfig;
use abrpack::domain::av::probe::FfprobeProber;
use abrpack::domain::av::segments::FfmpegTranscoder;
use abrpack::domain::jobs::{Job, SourceUpload};
use abrpack::{JobCoordinator, StatusChannel};
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

fn guess_content_type(path: &Path) -> Option<String> {
    let content_type = match path.extension()?.to_str()?.to_ascii_lowercase().as_str() {
        "mp4" => "video/mp4",
        "mkv" => "video/x-matroska",
        "webm" => "video/webm",
        "avi" => "video/x-msvideo",
        _ => return None,
    };
    Some(content_type.to_string())
}

#[tokio::main]
async fn main() {
    let mut args = std::env::args().skip(1);
    let input = match args.next() {
        Some(input) => PathBuf::from(input),
        None => {
            eprintln!("Usage: abrpack-package <input> [content-type]");
            std::process::exit(2);
        }
    };
    let content_type = args.next().or_else(|| guess_content_type(&input));

    let config = LocalConfig::from_env();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    // The job deletes its source once done, so it works on a copy.
    let file_name = input
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| String::from("input"));
    let source = config.upload_dir.join(format!("{}-{}", uuid::Uuid::new_v4(), file_name));
    if let Err(e) = tokio::fs::create_dir_all(&config.upload_dir).await {
        eprintln!("Failed to create {:?}: {}", config.upload_dir, e);
        std::process::exit(1);
    }
    if let Err(e) = tokio::fs::copy(&input, &source).await {
        eprintln!("Failed to read {:?}: {}", input, e);
        std::process::exit(1);
    }

    let coordinator = JobCoordinator::new(
        Arc::new(FsAdapter::new(&config.storage_dir, &config.public_base_url)),
        Arc::new(FfmpegTranscoder::new(
            &config.pipeline.ffmpeg_bin,
            config.pipeline.encoder_settings(),
        )),
        Arc::new(FfprobeProber::new(&config.pipeline.ffprobe_bin)),
        &config.pipeline,
    );

    let job = Job::new(
        SourceUpload {
            path: source,
            content_type,
        },
        &config.pipeline.work_dir,
    );
    let (status, mut events) = StatusChannel::open();

    let printer = async {
        while let Some(event) = events.next().await {
            print!("{}", event.encode());
        }
    };
    let (result, ()) = tokio::join!(coordinator.run(job, status), printer);

    if result.is_err() {
        std::process::exit(1);
    }
}
