//! Configuration for different deployment environments.

use crate::domain::av::segments::EncoderSettings;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Settings shared by every job, whatever the deployment.
#[derive(Clone, Debug)]
pub struct PipelineConfig {
    /// Root under which each job gets its own work directory
    pub work_dir: PathBuf,
    pub ffmpeg_bin: String,
    pub ffprobe_bin: String,
    /// Target HLS segment length
    pub segment_seconds: u32,
    /// Upload tries per file before giving up on it
    pub upload_attempts: u32,
    /// Wall-clock limit for one rendition (transcode and publish)
    pub rendition_timeout: Duration,
    /// Jobs allowed to run at the same time
    pub max_concurrent_jobs: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            work_dir: PathBuf::from("./work"),
            ffmpeg_bin: String::from("ffmpeg"),
            ffprobe_bin: String::from("ffprobe"),
            segment_seconds: 4,
            upload_attempts: 3,
            rendition_timeout: Duration::from_secs(3600),
            max_concurrent_jobs: 2,
        }
    }
}

impl PipelineConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();
        let defaults = Self::default();

        Self {
            work_dir: env::var("WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.work_dir),
            ffmpeg_bin: env::var("FFMPEG_BIN").unwrap_or(defaults.ffmpeg_bin),
            ffprobe_bin: env::var("FFPROBE_BIN").unwrap_or(defaults.ffprobe_bin),
            segment_seconds: var_or("SEGMENT_SECONDS", defaults.segment_seconds).max(1),
            upload_attempts: var_or("UPLOAD_ATTEMPTS", defaults.upload_attempts).max(1),
            rendition_timeout: Duration::from_secs(
                var_or("RENDITION_TIMEOUT_SECS", defaults.rendition_timeout.as_secs()).max(1),
            ),
            max_concurrent_jobs: var_or("MAX_CONCURRENT_JOBS", defaults.max_concurrent_jobs).max(1),
        }
    }

    pub fn encoder_settings(&self) -> EncoderSettings {
        EncoderSettings {
            segment_seconds: self.segment_seconds,
            ..EncoderSettings::default()
        }
    }
}

/// Configuration for local/monolith deployment.
#[cfg(feature = "local")]
#[derive(Clone, Debug)]
pub struct LocalConfig {
    /// HTTP server bind address
    pub addr: String,
    /// HTTP server port
    pub port: String,
    /// Directory receiving uploaded sources
    pub upload_dir: PathBuf,
    /// Directory the filesystem storage adapter publishes into
    pub storage_dir: PathBuf,
    /// URL prefix under which `storage_dir` is served
    pub public_base_url: String,
    pub pipeline: PipelineConfig,
}

#[cfg(feature = "local")]
impl LocalConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();

        let addr = env::var("ADDR").unwrap_or_else(|_| String::from("127.0.0.1"));
        let port = env::var("PORT").unwrap_or_else(|_| String::from("3000"));
        let public_base_url = env::var("PUBLIC_BASE_URL")
            .unwrap_or_else(|_| format!("http://{}:{}/media", addr, port));

        Self {
            upload_dir: PathBuf::from(
                env::var("UPLOAD_DIR").unwrap_or_else(|_| String::from("./uploads")),
            ),
            storage_dir: PathBuf::from(
                env::var("STORAGE_DIR").unwrap_or_else(|_| String::from("./published")),
            ),
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
            pipeline: PipelineConfig::from_env(),
            addr,
            port,
        }
    }
}

/// Configuration for publishing to S3.
#[cfg(feature = "aws")]
#[derive(Clone, Debug)]
pub struct AwsConfig {
    /// S3 bucket for published renditions
    pub s3_bucket: String,
    /// Public URL prefix of the bucket
    pub s3_public_url: String,
}

#[cfg(feature = "aws")]
impl AwsConfig {
    /// Load configuration from environment variables.
    /// Panics if required variables are not set.
    pub fn from_env() -> Self {
        let s3_bucket = env::var("S3_BUCKET").expect("S3_BUCKET env var required");
        let s3_public_url = env::var("S3_PUBLIC_URL")
            .unwrap_or_else(|_| format!("https://{}.s3.amazonaws.com", s3_bucket));

        Self {
            s3_public_url: s3_public_url.trim_end_matches('/').to_string(),
            s3_bucket,
        }
    }
}

fn var_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|value| value.trim().parse().ok())
        .unwrap_or(default)
}
