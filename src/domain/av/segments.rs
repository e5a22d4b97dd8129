//! Segmented HLS encoding of one rendition.

use super::letterbox::Letterbox;
use super::video_stream::VideoStream;
use crate::domain::ladder::Rendition;
use crate::error::TranscodeError;
use async_trait::async_trait;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::OnceLock;
use tokio::process::Command;

pub const SEGMENT_EXTENSION: &str = "ts";
pub const MANIFEST_EXTENSION: &str = "m3u8";
pub const MANIFEST_FILE: &str = "index.m3u8";
pub const SEGMENT_PATTERN: &str = "%03d.ts";

const STDERR_TAIL_LINES: usize = 20;

/// A file produced by the encoder in a rendition directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Artifact {
    Segment { path: PathBuf, sequence: u32 },
    Manifest(PathBuf),
}

impl Artifact {
    /// Classify by file name; anything else (temp files included) is `None`.
    pub fn from_path(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_str()?;
        match path.extension()?.to_str()? {
            SEGMENT_EXTENSION => segment_sequence(name).map(|sequence| Artifact::Segment {
                path: path.to_path_buf(),
                sequence,
            }),
            MANIFEST_EXTENSION => Some(Artifact::Manifest(path.to_path_buf())),
            _ => None,
        }
    }
}

/// Sequence number of a segment file name such as `007.ts`.
pub fn segment_sequence(file_name: &str) -> Option<u32> {
    static SEGMENT_NAME: OnceLock<Regex> = OnceLock::new();
    let re = SEGMENT_NAME.get_or_init(|| Regex::new(r"^(\d+)\.ts$").expect("valid segment regex"));
    re.captures(file_name)?.get(1)?.as_str().parse().ok()
}

/// Encoder parameters shared by every rendition.
#[derive(Debug, Clone)]
pub struct EncoderSettings {
    pub segment_seconds: u32,
    pub preset: String,
    pub crf: u8,
    pub keyframe_interval: u32,
    pub audio_bitrate: String,
}

impl Default for EncoderSettings {
    fn default() -> Self {
        Self {
            segment_seconds: 4,
            preset: "veryfast".to_string(),
            crf: 23,
            keyframe_interval: 48,
            audio_bitrate: "128k".to_string(),
        }
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TranscodeExecutor: Send + Sync {
    /// Write `NNN.ts` segments and `index.m3u8` into `rendition.directory`.
    /// Returns once the manifest and every segment before it are on disk.
    async fn transcode(
        &self,
        source: &Path,
        source_stream: VideoStream,
        rendition: &Rendition,
    ) -> Result<(), TranscodeError>;
}

pub struct FfmpegTranscoder {
    binary: PathBuf,
    settings: EncoderSettings,
}

impl FfmpegTranscoder {
    pub fn new(binary: impl Into<PathBuf>, settings: EncoderSettings) -> Self {
        Self {
            binary: binary.into(),
            settings,
        }
    }

    pub fn args(&self, source: &Path, source_stream: VideoStream, rendition: &Rendition) -> Vec<String> {
        let letterbox = Letterbox::fit(
            source_stream.width,
            source_stream.height,
            rendition.width,
            rendition.height,
        );
        let gop = self.settings.keyframe_interval.to_string();
        let crf = self.settings.crf.to_string();
        let hls_time = self.settings.segment_seconds.to_string();
        let segment_pattern = rendition.directory.join(SEGMENT_PATTERN);
        let manifest = rendition.directory.join(MANIFEST_FILE);

        let mut args: Vec<String> = ["-hide_banner", "-nostats", "-loglevel", "error", "-y", "-i"]
            .map(String::from)
            .to_vec();
        args.push(source.to_string_lossy().into_owned());
        args.push("-vf".to_string());
        args.push(letterbox.filter());
        args.extend(
            [
                "-c:v",
                "libx264",
                "-preset",
                self.settings.preset.as_str(),
                "-crf",
                crf.as_str(),
                "-g",
                gop.as_str(),
                "-keyint_min",
                gop.as_str(),
                "-sc_threshold",
                "0",
                "-c:a",
                "aac",
                "-b:a",
                self.settings.audio_bitrate.as_str(),
                "-f",
                "hls",
                "-hls_time",
                hls_time.as_str(),
                "-hls_playlist_type",
                "vod",
                "-hls_flags",
                "temp_file",
                "-hls_segment_filename",
            ]
            .map(String::from),
        );
        args.push(segment_pattern.to_string_lossy().into_owned());
        args.push(manifest.to_string_lossy().into_owned());
        args
    }
}

#[async_trait]
impl TranscodeExecutor for FfmpegTranscoder {
    async fn transcode(
        &self,
        source: &Path,
        source_stream: VideoStream,
        rendition: &Rendition,
    ) -> Result<(), TranscodeError> {
        let args = self.args(source, source_stream, rendition);

        tracing::info!(
            rendition = %rendition.name(),
            width = rendition.width,
            height = rendition.height,
            "Running encoder"
        );
        tracing::debug!(?args, "Encoder arguments");

        let output = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await?;

        if !output.status.success() {
            return Err(TranscodeError::EncoderFailed {
                status: output.status,
                stderr: stderr_tail(&output.stderr),
            });
        }

        let manifest = rendition.directory.join(MANIFEST_FILE);
        if !tokio::fs::try_exists(&manifest).await.unwrap_or(false) {
            return Err(TranscodeError::ManifestMissing { path: manifest });
        }

        tracing::info!(rendition = %rendition.name(), "Encoder finished");
        Ok(())
    }
}

fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    lines[start..].join("\n")
}
