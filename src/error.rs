//! Error types for the packaging pipeline.

use std::path::PathBuf;
use std::process::ExitStatus;

/// Errors raised while computing a rendition plan.
#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    #[error("invalid source dimensions: {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },
}

/// Errors raised while reading an HLS playlist.
#[derive(Debug, thiserror::Error)]
pub enum PlaylistError {
    #[error("missing #EXTM3U header")]
    MissingHeader,

    #[error("invalid value on line {line}: {text}")]
    InvalidLine { line: usize, text: String },

    #[error("#EXTINF on line {line} is not followed by a segment URI")]
    DanglingSegment { line: usize },
}

/// Errors raised while inspecting a source file.
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("failed to run ffprobe: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("ffprobe exited with {status}: {stderr}")]
    Failed { status: ExitStatus, stderr: String },

    #[error("failed to parse ffprobe output: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("no video stream found")]
    NoVideoStream,
}

/// Errors raised by a single rendition's encoder run.
#[derive(Debug, thiserror::Error)]
pub enum TranscodeError {
    #[error("failed to start encoder: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("encoder exited with {status}: {stderr}")]
    EncoderFailed { status: ExitStatus, stderr: String },

    /// Used by executors that do not wrap a real process.
    #[error("encoder failed: {0}")]
    Other(String),

    #[error("encoder finished without writing {}", path.display())]
    ManifestMissing { path: PathBuf },
}

/// Errors raised by a rendition publisher.
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("directory watch failed: {0}")]
    Watch(#[from] notify::Error),

    #[error("directory watch closed before the manifest was published")]
    WatchClosed,

    #[error("encoder finished but no manifest was found in {}", dir.display())]
    ManifestMissing { dir: PathBuf },

    #[error("failed to read manifest {}: {source}", path.display())]
    ManifestRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid manifest: {0}")]
    Manifest(#[from] PlaylistError),

    #[error("watched directory {} is no longer accessible", dir.display())]
    DirectoryGone { dir: PathBuf },

    #[error("failed to upload {file}: {message}")]
    Upload { file: String, message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Everything that can end a job. The `Display` output is the message sent
/// to the client in the terminal failure event.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Invalid file type. Only video files are allowed.")]
    UnsupportedContainer { content_type: Option<String> },

    #[error("Video resolution too low: {width}x{height}")]
    ResolutionTooLow { width: u32, height: u32 },

    #[error("Aspect ratio should be landscape")]
    NotLandscape { width: u32, height: u32 },

    #[error("Failed to read video metadata: {0}")]
    Probe(#[from] ProbeError),

    #[error(transparent)]
    Plan(#[from] PlanError),

    #[error("{rendition} transcode failed: {source}")]
    Transcode {
        rendition: String,
        source: TranscodeError,
    },

    #[error("{rendition} publish failed: {source}")]
    Publish {
        rendition: String,
        source: PublishError,
    },

    #[error("{rendition} timed out after {seconds}s")]
    Timeout { rendition: String, seconds: u64 },

    #[error("worker pool closed")]
    PoolClosed(#[from] tokio::sync::AcquireError),

    #[error("rendition task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("Failed to upload master playlist: {0}")]
    MasterUpload(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
